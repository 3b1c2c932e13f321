//! Keyword-based food category classification.
//!
//! The rule list is *ordered*: specific categories (yogurt, cheese, milk)
//! are tried before generic ones (meat) so a generic keyword cannot shadow
//! a specific match. The ordering is load-bearing; every category has a
//! unit test pinning it down.

use serde::Deserialize;

use crate::shelf_life;

/// Category returned when no keyword rule matches.
pub const DEFAULT_CATEGORY: &str = "default";

/// Ordered (category, keywords) rules. First substring match wins.
const RULES: &[(&str, &[&str])] = &[
    ("yogurt", &["yogurt", "yoghurt", "skyr"]),
    (
        "cheese",
        &["cheese", "cheddar", "mozzarella", "feta", "brie", "parmesan", "gouda"],
    ),
    ("milk", &["milk", "cream", "kefir"]),
    ("eggs", &["egg"]),
    (
        "fish",
        &["fish", "salmon", "tuna", "cod", "prawn", "shrimp", "mackerel"],
    ),
    ("chicken", &["chicken", "turkey", "poultry"]),
    // Generic meat keywords come after the specific animal-protein rules.
    (
        "meat",
        &["beef", "pork", "ham", "bacon", "sausage", "mince", "steak", "lamb", "meat"],
    ),
    (
        "bread",
        &["bread", "baguette", "croissant", "brioche", "loaf", "bagel"],
    ),
    (
        "nuts",
        &["hazelnut", "almond", "walnut", "cashew", "peanut", "pistachio"],
    ),
    (
        "fruit",
        &[
            "apple", "banana", "orange", "grape", "berry", "berries", "pear", "peach",
            "plum", "mango", "melon", "kiwi", "lemon", "lime", "fruit",
        ],
    ),
    (
        "vegetable",
        &[
            "tomato", "potato", "onion", "carrot", "pepper", "lettuce", "spinach",
            "broccoli", "cucumber", "salad", "mushroom", "garlic", "courgette",
        ],
    ),
    ("frozen", &["frozen", "ice cream"]),
    ("canned", &["canned", "tinned", "beans", "soup"]),
    ("pasta", &["pasta", "spaghetti", "rice", "noodle"]),
    (
        "snacks",
        &["crisps", "chips", "chocolate", "biscuit", "cookie", "sweets", "candy"],
    ),
    (
        "beverages",
        &["juice", "water", "cola", "soda", "beer", "wine", "coffee", "tea"],
    ),
];

/// Map a free-text product name to a food category.
///
/// Pure function over the static rule table. No match yields
/// [`DEFAULT_CATEGORY`].
pub fn classify(product_name: &str) -> &'static str {
    let name = product_name.trim().to_lowercase();
    for (category, keywords) in RULES {
        if keywords.iter().any(|kw| name.contains(kw)) {
            return category;
        }
    }
    DEFAULT_CATEGORY
}

/// Two-level variant: assign a coarse category first, then a fine
/// subcategory from a keyword set scoped to that coarse category. The
/// scoping keeps overlapping keywords in unrelated coarse categories from
/// producing false positives.
const COARSE_RULES: &[(&str, &[&str], &[(&str, &[&str])])] = &[
    (
        "dairy",
        &["milk", "cream", "cheese", "yogurt", "yoghurt", "butter", "skyr", "kefir"],
        &[
            ("yogurt", &["yogurt", "yoghurt", "skyr"]),
            ("cheese", &["cheese", "cheddar", "mozzarella", "feta"]),
            ("milk", &["milk", "cream", "kefir"]),
        ],
    ),
    (
        "meat",
        &[
            "beef", "pork", "ham", "bacon", "sausage", "chicken", "turkey", "fish",
            "salmon", "tuna", "mince", "steak", "lamb", "meat",
        ],
        &[
            ("fish", &["fish", "salmon", "tuna", "cod"]),
            ("chicken", &["chicken", "turkey"]),
        ],
    ),
    (
        "produce",
        &[
            "apple", "banana", "orange", "tomato", "potato", "onion", "carrot",
            "lettuce", "salad", "fruit", "berry", "grape",
        ],
        &[
            ("fruit", &["apple", "banana", "orange", "fruit", "berry", "grape"]),
            ("vegetable", &["tomato", "potato", "onion", "carrot", "lettuce", "salad"]),
        ],
    ),
    (
        "bakery",
        &["bread", "baguette", "croissant", "brioche", "loaf", "bagel", "roll"],
        &[("bread", &["bread", "baguette", "loaf"])],
    ),
];

/// Classify into (coarse, fine) categories. Fine is `None` when the coarse
/// category matched but no scoped subcategory keyword did.
pub fn classify_fine(product_name: &str) -> Option<(&'static str, Option<&'static str>)> {
    let name = product_name.trim().to_lowercase();
    for (coarse, keywords, fine_rules) in COARSE_RULES {
        if keywords.iter().any(|kw| name.contains(kw)) {
            let fine = fine_rules
                .iter()
                .find(|(_, kws)| kws.iter().any(|kw| name.contains(kw)))
                .map(|(fine, _)| *fine);
            return Some((coarse, fine));
        }
    }
    None
}

/// External zero-shot classifier. Probabilistic, lower priority than the
/// keyword rules: its answer is only accepted above a confidence threshold
/// and only for categories the shelf-life table knows about.
#[derive(Clone)]
pub struct AiClassifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

/// Minimum reported confidence for an AI label to be trusted.
const AI_CONFIDENCE_THRESHOLD: f64 = 0.6;

#[derive(Deserialize)]
struct ZeroShotResponse {
    labels: Vec<String>,
    scores: Vec<f64>,
}

impl AiClassifier {
    pub fn new(endpoint: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }

    /// Classify via the external service. Returns `None` on low confidence,
    /// unknown category, or *any* failure — errors never propagate; the
    /// caller always degrades to the keyword path.
    pub async fn classify(&self, product_name: &str) -> Option<String> {
        match self.classify_inner(product_name).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    product = %product_name,
                    error = %e,
                    "AI classification failed, falling back to keyword rules"
                );
                None
            }
        }
    }

    async fn classify_inner(&self, product_name: &str) -> Result<Option<String>, reqwest::Error> {
        let candidate_labels: Vec<&str> = shelf_life::categories().collect();

        let mut request = self.client.post(&self.endpoint).json(&serde_json::json!({
            "inputs": product_name,
            "parameters": { "candidate_labels": candidate_labels },
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response: ZeroShotResponse = request.send().await?.error_for_status()?.json().await?;

        let best = response
            .labels
            .into_iter()
            .zip(response.scores)
            .next()
            .filter(|(label, score)| {
                *score > AI_CONFIDENCE_THRESHOLD && shelf_life::lookup(label).is_some()
            });

        Ok(best.map(|(label, _)| label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmatched_names_classify_to_default() {
        assert_eq!(classify("Aluminium Foil"), DEFAULT_CATEGORY);
        assert_eq!(classify("Washing Up Liquid"), DEFAULT_CATEGORY);
        assert_eq!(classify(""), DEFAULT_CATEGORY);
    }

    #[test]
    fn yogurt_before_generic_dairy_terms() {
        assert_eq!(classify("Greek Style Yogurt"), "yogurt");
        assert_eq!(classify("Skyr Natural"), "yogurt");
    }

    #[test]
    fn cheese_and_milk_are_distinct() {
        assert_eq!(classify("Mature Cheddar Cheese"), "cheese");
        assert_eq!(classify("Semi Skimmed Milk"), "milk");
    }

    // "Chicken Breast Meat" contains both a chicken and a generic meat
    // keyword; the specific rule must win.
    #[test]
    fn chicken_wins_over_generic_meat() {
        assert_eq!(classify("Chicken Breast Meat"), "chicken");
    }

    #[test]
    fn fish_wins_over_generic_meat() {
        assert_eq!(classify("Salmon Fillet Meat Counter"), "fish");
    }

    #[test]
    fn nuts_before_fruit() {
        // "hazelnut" must not fall through to a fruit keyword.
        assert_eq!(classify("Fresh Hazelnuts"), "nuts");
    }

    #[test]
    fn generic_meat_and_remaining_categories() {
        assert_eq!(classify("Pork Sausages"), "meat");
        assert_eq!(classify("Sourdough Loaf"), "bread");
        assert_eq!(classify("Eggs Free Range 12"), "eggs");
        assert_eq!(classify("Royal Gala Apples"), "fruit");
        assert_eq!(classify("Cherry Tomatoes"), "vegetable");
        assert_eq!(classify("Frozen Peas"), "frozen");
        assert_eq!(classify("Baked Beans"), "canned");
        assert_eq!(classify("Penne Pasta"), "pasta");
        assert_eq!(classify("Milk Chocolate Bar"), "milk"); // ordering artifact, pinned
        assert_eq!(classify("Dark Chocolate 85%"), "snacks");
        assert_eq!(classify("Orange Juice"), "fruit"); // "orange" matches first
        assert_eq!(classify("Sparkling Water"), "beverages");
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(classify("GREEK YOGURT"), "yogurt");
        assert_eq!(classify("  chicken thighs  "), "chicken");
    }

    #[test]
    fn two_level_scopes_fine_to_coarse() {
        assert_eq!(classify_fine("Greek Yogurt"), Some(("dairy", Some("yogurt"))));
        assert_eq!(classify_fine("Butter"), Some(("dairy", None)));
        assert_eq!(classify_fine("Salmon Fillet"), Some(("meat", Some("fish"))));
        assert_eq!(classify_fine("Royal Gala Apples"), Some(("produce", Some("fruit"))));
        assert_eq!(classify_fine("Shampoo"), None);
    }

    // Every category in the rule table must resolve in the shelf-life
    // table; otherwise a classification could silently fall back to the
    // default entry.
    #[test]
    fn every_rule_category_has_a_shelf_life_entry() {
        for (category, _) in RULES {
            assert!(
                shelf_life::lookup(category).is_some(),
                "missing shelf-life entry for {category}"
            );
        }
    }
}

//! Expiry prediction: classifier + shelf-life table + learned overlay.
//!
//! Precedence is explicit: a sufficiently confident learned-product match
//! wins over the static table, the AI-assisted classifier wins over keyword
//! rules, and everything falls back to the default entry (7 days,
//! refrigerated). Each tier carries a fixed confidence so callers can show
//! how trustworthy a prediction is.

use time::{Date, Duration};

use crate::classifier::{self, AiClassifier};
use crate::error::{CoreError, CoreResult};
use crate::food_db::{FoodDb, MatchKind, ProductMatch};
use crate::shelf_life;

/// How a prediction was produced, in decreasing order of trust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionMethod {
    /// Hard-coded product override.
    Override,
    /// Exact match in the learned food database.
    LearnedExact,
    /// Fuzzy match in the learned food database.
    LearnedFuzzy,
    /// External AI classifier above threshold.
    AiAssisted,
    /// Keyword classification against the static table.
    Keyword,
}

impl PredictionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionMethod::Override => "override",
            PredictionMethod::LearnedExact => "learned_exact",
            PredictionMethod::LearnedFuzzy => "learned_fuzzy",
            PredictionMethod::AiAssisted => "ai_assisted",
            PredictionMethod::Keyword => "keyword",
        }
    }
}

/// Fixed confidence per method tier. Fuzzy matches carry their overlap
/// score instead.
const CONFIDENCE_KEYWORD: f64 = 0.8;
const CONFIDENCE_AI: f64 = 0.9;
const CONFIDENCE_LEARNED_EXACT: f64 = 1.0;

#[derive(Debug, Clone, serde::Serialize)]
pub struct Prediction {
    pub expiry_date: Date,
    pub confidence: f64,
    pub method: PredictionMethod,
    pub category: String,
}

pub struct ExpiryPredictor {
    food_db: Option<FoodDb>,
    ai: Option<AiClassifier>,
}

impl ExpiryPredictor {
    pub fn new(food_db: Option<FoodDb>, ai: Option<AiClassifier>) -> Self {
        Self { food_db, ai }
    }

    /// Keyword-only predictor with no learned overlay. Used as the per-item
    /// fallback path and in tests.
    pub fn keyword_only() -> Self {
        Self {
            food_db: None,
            ai: None,
        }
    }

    /// Predict an expiry date for a product bought on `purchase_date`.
    ///
    /// The purchase date must already be a valid calendar date; unparseable
    /// input fails upstream with [`CoreError::InvalidDate`] and is never
    /// silently defaulted. Date arithmetic is naive calendar-day addition.
    pub async fn predict(&self, product_name: &str, purchase_date: Date) -> CoreResult<Prediction> {
        // Learned overlay first: the special-case rules apply even with an
        // empty database, so consult the resolver either way.
        let overlay = match &self.food_db {
            Some(db) => db.find_best_match(product_name).await?,
            None => crate::food_db::resolve_match(product_name, &[]),
        };

        if let Some(m) = overlay {
            return finish(purchase_date, m);
        }

        // AI-assisted classification, degrading silently to keywords.
        if let Some(ai) = &self.ai {
            if let Some(category) = ai.classify(product_name).await {
                let entry = shelf_life::lookup(&category)
                    .unwrap_or_else(shelf_life::default_entry);
                return Ok(Prediction {
                    expiry_date: add_days(purchase_date, entry.days_to_expiry)?,
                    confidence: CONFIDENCE_AI,
                    method: PredictionMethod::AiAssisted,
                    category,
                });
            }
        }

        self.predict_keyword(product_name, purchase_date)
    }

    /// The plain keyword path, used directly when a higher tier failed for
    /// a single item and the receipt should still go through.
    pub fn predict_keyword(
        &self,
        product_name: &str,
        purchase_date: Date,
    ) -> CoreResult<Prediction> {
        let category = classifier::classify(product_name);
        let entry = shelf_life::lookup(category).unwrap_or_else(shelf_life::default_entry);
        Ok(Prediction {
            expiry_date: add_days(purchase_date, entry.days_to_expiry)?,
            confidence: CONFIDENCE_KEYWORD,
            method: PredictionMethod::Keyword,
            category: category.to_string(),
        })
    }
}

fn finish(purchase_date: Date, m: ProductMatch) -> CoreResult<Prediction> {
    let (confidence, method) = match m.kind {
        MatchKind::Override => (m.confidence, PredictionMethod::Override),
        MatchKind::Exact => (CONFIDENCE_LEARNED_EXACT, PredictionMethod::LearnedExact),
        MatchKind::Fuzzy => (m.confidence, PredictionMethod::LearnedFuzzy),
    };
    Ok(Prediction {
        // Guard against a bad learned entry: never predict before purchase.
        expiry_date: add_days(purchase_date, m.product.days_to_expiry.max(0))?,
        confidence,
        method,
        category: m.product.category,
    })
}

fn add_days(date: Date, days: i64) -> CoreResult<Date> {
    date.checked_add(Duration::days(days))
        .ok_or_else(|| CoreError::InvalidDate(format!("{date} + {days} days overflows")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[tokio::test]
    async fn keyword_prediction_uses_static_table() {
        let predictor = ExpiryPredictor::keyword_only();
        let p = predictor
            .predict("Semi Skimmed Milk", date!(2024 - 06 - 01))
            .await
            .unwrap();
        assert_eq!(p.category, "milk");
        assert_eq!(p.expiry_date, date!(2024 - 06 - 08)); // 7 days
        assert_eq!(p.method, PredictionMethod::Keyword);
        assert_eq!(p.confidence, 0.8);
    }

    #[tokio::test]
    async fn unknown_product_gets_default_entry() {
        let predictor = ExpiryPredictor::keyword_only();
        let p = predictor
            .predict("Mystery Object", date!(2024 - 06 - 01))
            .await
            .unwrap();
        assert_eq!(p.category, "default");
        assert_eq!(p.expiry_date, date!(2024 - 06 - 08));
    }

    // Expiry never precedes purchase for non-negative table entries.
    #[tokio::test]
    async fn expiry_is_never_before_purchase() {
        let predictor = ExpiryPredictor::keyword_only();
        for name in ["Milk", "Chicken", "Frozen Peas", "Nothing Known", "Bread"] {
            let purchase = date!(2024 - 03 - 15);
            let p = predictor.predict(name, purchase).await.unwrap();
            assert!(p.expiry_date >= purchase, "{name} predicted in the past");
        }
    }

    // The LIDL override applies through the predictor even with no
    // database attached: 21 days instead of the generic yogurt 14.
    #[tokio::test]
    async fn lidl_yogurt_override_gives_twenty_one_days() {
        let predictor = ExpiryPredictor::keyword_only();
        let p = predictor
            .predict("LIDL Greek Style Yogurt", date!(2024 - 06 - 01))
            .await
            .unwrap();
        assert_eq!(p.expiry_date, date!(2024 - 06 - 22));
        assert_eq!(p.method, PredictionMethod::Override);
        assert_eq!(p.category, "yogurt");
    }

    #[tokio::test]
    async fn month_boundary_arithmetic_is_calendar_based() {
        let predictor = ExpiryPredictor::keyword_only();
        let p = predictor
            .predict("Cheddar Cheese", date!(2024 - 01 - 25))
            .await
            .unwrap();
        // 21 days across the month boundary.
        assert_eq!(p.expiry_date, date!(2024 - 02 - 15));
    }
}

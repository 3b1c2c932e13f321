//! Dynamic food database: a persisted, self-improving overlay on the static
//! shelf-life table.
//!
//! Matching precedence (highest first):
//!   1. hard-coded special cases for known ambiguous, high-value products
//!      (a pragmatic override, not a general mechanism);
//!   2. case-insensitive exact name match (confidence 1.0);
//!   3. fuzzy word-overlap match, accepted only above a score threshold.
//!
//! Learning is driven by user corrections and is best-effort: a persistence
//! failure here is logged and swallowed, never surfaced to the user.

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use shelfwise_shared::StorageType;

use crate::classifier;
use crate::error::CoreResult;

/// Minimum fuzzy word-overlap score for a match to be accepted.
const FUZZY_THRESHOLD: f64 = 0.3;

/// Confidence assigned to a product learned from a correction with no
/// prior match.
const LEARNED_CONFIDENCE: f64 = 0.8;

/// Exponential smoothing weights for correction-driven updates.
const SMOOTHING_OLD: f64 = 0.7;
const SMOOTHING_NEW: f64 = 0.3;

/// A correction within this many days of the stored value counts as small
/// and raises confidence; anything larger lowers it.
const SMALL_CORRECTION_DAYS: i64 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct FoodProduct {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub days_to_expiry: i64,
    pub storage_type: StorageType,
    pub store_specific: bool,
    pub confidence: f64,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Hard-coded special-case rule.
    Override,
    /// Case-insensitive exact name match.
    Exact,
    /// Word-overlap fuzzy match.
    Fuzzy,
}

#[derive(Debug, Clone)]
pub struct ProductMatch {
    pub product: FoodProduct,
    pub confidence: f64,
    pub kind: MatchKind,
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    category: String,
    days_to_expiry: i32,
    storage_type: String,
    store_specific: bool,
    confidence: f64,
    updated_at: OffsetDateTime,
}

impl From<ProductRow> for FoodProduct {
    fn from(row: ProductRow) -> Self {
        FoodProduct {
            id: row.id,
            name: row.name,
            category: row.category,
            days_to_expiry: row.days_to_expiry as i64,
            storage_type: StorageType::parse(&row.storage_type),
            store_specific: row.store_specific,
            confidence: row.confidence,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct FoodDb {
    pool: PgPool,
}

impl FoodDb {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find the best stored product for a free-text query.
    pub async fn find_best_match(&self, name: &str) -> CoreResult<Option<ProductMatch>> {
        let candidates = self.fetch_candidates(name).await?;
        Ok(resolve_match(name, &candidates))
    }

    /// Fetch candidates by exact name or by containment of any query word
    /// of three or more characters.
    async fn fetch_candidates(&self, name: &str) -> CoreResult<Vec<FoodProduct>> {
        let patterns: Vec<String> = query_words(name)
            .map(|word| format!("%{}%", word))
            .collect();

        let rows: Vec<ProductRow> = sqlx::query_as(
            r#"
            SELECT id, name, category, days_to_expiry, storage_type,
                   store_specific, confidence, updated_at
            FROM food_products
            WHERE LOWER(name) = LOWER($1) OR name ILIKE ANY($2)
            "#,
        )
        .bind(name)
        .bind(&patterns)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FoodProduct::from).collect())
    }

    /// Insert or update a product, keyed by case-insensitive name.
    pub async fn save_product(&self, product: &FoodProduct) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO food_products
                (id, name, category, days_to_expiry, storage_type,
                 store_specific, confidence, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (LOWER(name)) DO UPDATE SET
                category = EXCLUDED.category,
                days_to_expiry = EXCLUDED.days_to_expiry,
                storage_type = EXCLUDED.storage_type,
                store_specific = EXCLUDED.store_specific,
                confidence = EXCLUDED.confidence,
                updated_at = NOW()
            "#,
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.category)
        .bind(product.days_to_expiry as i32)
        .bind(product.storage_type.as_str())
        .bind(product.store_specific)
        .bind(product.confidence)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Learn from a user correcting an item's expiry. Best-effort: any
    /// persistence error is logged and swallowed so the correction flow
    /// never blocks on the learning path.
    pub async fn learn_from_correction(
        &self,
        name: &str,
        original_days: i64,
        corrected_days: i64,
    ) {
        if let Err(e) = self
            .learn_from_correction_inner(name, original_days, corrected_days)
            .await
        {
            tracing::warn!(
                product = %name,
                error = %e,
                "Failed to persist correction; learning skipped"
            );
        }
    }

    async fn learn_from_correction_inner(
        &self,
        name: &str,
        original_days: i64,
        corrected_days: i64,
    ) -> CoreResult<()> {
        let existing = self.find_best_match(name).await?;

        let product = match existing {
            // Overrides always win resolution, so a row learned here would be
            // shadowed forever. Corrections against them are dropped.
            Some(m) if m.kind == MatchKind::Override => {
                tracing::debug!(
                    product = %m.product.name,
                    "Correction matched a hard-coded override; not learned"
                );
                return Ok(());
            }
            Some(m) => {
                let updated = apply_correction(&m.product, corrected_days);
                tracing::debug!(
                    product = %updated.name,
                    days = updated.days_to_expiry,
                    confidence = updated.confidence,
                    "Updated learned product from correction"
                );
                updated
            }
            None => {
                let product = FoodProduct {
                    id: Uuid::new_v4(),
                    name: name.to_string(),
                    category: classifier::classify(name).to_string(),
                    days_to_expiry: corrected_days,
                    storage_type: infer_storage_type(name, corrected_days),
                    store_specific: false,
                    confidence: LEARNED_CONFIDENCE,
                    updated_at: OffsetDateTime::now_utc(),
                };
                tracing::debug!(
                    product = %product.name,
                    days = product.days_to_expiry,
                    "Learned new product from correction"
                );
                product
            }
        };

        let _ = original_days; // the stored value, not the caller's claim, drives smoothing
        self.save_product(&product).await
    }
}

/// Words of three or more characters, lowercased. Shorter words generate
/// too many spurious containment matches.
fn query_words(name: &str) -> impl Iterator<Item = String> + '_ {
    name.split_whitespace()
        .filter(|w| w.chars().count() >= 3)
        .map(|w| w.to_lowercase())
}

/// Pure matching core, applied to fetched candidates. Also consulted with
/// an empty candidate list so the static special cases work before anything
/// has been learned.
pub fn resolve_match(name: &str, candidates: &[FoodProduct]) -> Option<ProductMatch> {
    let query = name.trim().to_lowercase();

    if let Some(m) = special_case_match(&query, candidates) {
        return Some(m);
    }

    if let Some(product) = candidates
        .iter()
        .find(|c| c.name.to_lowercase() == query)
    {
        return Some(ProductMatch {
            product: product.clone(),
            confidence: 1.0,
            kind: MatchKind::Exact,
        });
    }

    fuzzy_match(&query, candidates)
}

/// Hard-coded overrides for known ambiguous, high-value products. These are
/// pragmatic exceptions, not a general mechanism; add to them sparingly.
fn special_case_match(query: &str, candidates: &[FoodProduct]) -> Option<ProductMatch> {
    // Hazelnut queries must resolve to the stored hazelnut product
    // regardless of fuzzy score (packaging prefixes like "Fresh" otherwise
    // dilute the overlap below threshold).
    if query.contains("hazelnut") {
        if let Some(product) = candidates.iter().find(|c| {
            let n = c.name.to_lowercase();
            n == "hazelnuts" || n == "hazelnut"
        }) {
            return Some(ProductMatch {
                confidence: product.confidence,
                product: product.clone(),
                kind: MatchKind::Override,
            });
        }
    }

    // LIDL own-brand yogurt lasts well past the generic table value.
    if query.contains("lidl") && (query.contains("yogurt") || query.contains("yoghurt")) {
        return Some(ProductMatch {
            product: FoodProduct {
                id: Uuid::nil(),
                name: "LIDL Greek Style Yogurt".to_string(),
                category: "yogurt".to_string(),
                days_to_expiry: 21,
                storage_type: StorageType::Refrigerated,
                store_specific: true,
                confidence: 0.95,
                updated_at: OffsetDateTime::UNIX_EPOCH,
            },
            confidence: 0.95,
            kind: MatchKind::Override,
        });
    }

    None
}

/// Word-overlap scoring: matched words over the larger of the two word
/// counts, counting only words of three or more characters.
fn fuzzy_match(query: &str, candidates: &[FoodProduct]) -> Option<ProductMatch> {
    let query_words: Vec<String> = query
        .split_whitespace()
        .filter(|w| w.chars().count() >= 3)
        .map(|w| w.to_lowercase())
        .collect();
    if query_words.is_empty() {
        return None;
    }

    let mut best: Option<(f64, &FoodProduct)> = None;
    for candidate in candidates {
        let candidate_words: Vec<String> = candidate
            .name
            .split_whitespace()
            .filter(|w| w.chars().count() >= 3)
            .map(|w| w.to_lowercase())
            .collect();
        if candidate_words.is_empty() {
            continue;
        }

        let matched = query_words
            .iter()
            .filter(|w| candidate_words.contains(w))
            .count();
        let score = matched as f64 / query_words.len().max(candidate_words.len()) as f64;

        if best.map(|(s, _)| score > s).unwrap_or(true) {
            best = Some((score, candidate));
        }
    }

    best.filter(|(score, _)| *score > FUZZY_THRESHOLD)
        .map(|(score, product)| ProductMatch {
            product: product.clone(),
            confidence: score,
            kind: MatchKind::Fuzzy,
        })
}

/// Apply a correction to an existing product: exponential smoothing on the
/// days value, confidence nudged up for small corrections and down for
/// large ones, clamped to [0, 1]. The zero floor is enforced explicitly.
pub fn apply_correction(product: &FoodProduct, corrected_days: i64) -> FoodProduct {
    let smoothed =
        SMOOTHING_OLD * product.days_to_expiry as f64 + SMOOTHING_NEW * corrected_days as f64;
    let delta = (product.days_to_expiry - corrected_days).abs();
    let adjustment = if delta < SMALL_CORRECTION_DAYS { 0.1 } else { -0.1 };
    let confidence = (product.confidence + adjustment).clamp(0.0, 1.0);

    FoodProduct {
        days_to_expiry: smoothed.round() as i64,
        confidence,
        updated_at: OffsetDateTime::now_utc(),
        ..product.clone()
    }
}

/// Infer storage for a newly learned product from its name and corrected
/// shelf life.
pub fn infer_storage_type(name: &str, days_to_expiry: i64) -> StorageType {
    let lower = name.to_lowercase();
    if lower.contains("frozen") || days_to_expiry > 60 {
        return StorageType::Frozen;
    }
    const CHILLED_KEYWORDS: &[&str] = &[
        "milk", "cheese", "yogurt", "yoghurt", "cream", "butter", "meat", "chicken",
        "beef", "pork", "fish", "salmon", "fresh",
    ];
    if CHILLED_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return StorageType::Refrigerated;
    }
    StorageType::RoomTemperature
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(name: &str, days: i64, confidence: f64) -> FoodProduct {
        FoodProduct {
            id: Uuid::new_v4(),
            name: name.to_string(),
            category: classifier::classify(name).to_string(),
            days_to_expiry: days,
            storage_type: StorageType::Refrigerated,
            store_specific: false,
            confidence,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn exact_match_has_full_confidence() {
        let candidates = vec![product("Greek Yogurt", 14, 0.9)];
        let m = resolve_match("greek yogurt", &candidates).unwrap();
        assert_eq!(m.kind, MatchKind::Exact);
        assert_eq!(m.confidence, 1.0);
    }

    #[test]
    fn fuzzy_match_scores_by_word_overlap() {
        let candidates = vec![product("Semi Skimmed Milk", 7, 0.9)];
        // 2 of max(3, 3) words match: score 0.666...
        let m = resolve_match("skimmed milk bottle", &candidates).unwrap();
        assert_eq!(m.kind, MatchKind::Fuzzy);
        assert!((m.confidence - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn fuzzy_match_below_threshold_is_rejected() {
        let candidates = vec![product("Organic Whole Milk Four Pint Bottle", 7, 0.9)];
        // 1 matched word over max(2, 6) = 0.166, under the 0.3 threshold.
        assert!(resolve_match("oat milk", &candidates).is_none());
    }

    #[test]
    fn no_candidates_no_match() {
        assert!(resolve_match("mystery item", &[]).is_none());
    }

    // Hazelnut override fires regardless of fuzzy score.
    #[test]
    fn hazelnut_override_beats_fuzzy_scoring() {
        let candidates = vec![product("Hazelnuts", 90, 0.95)];
        let m = resolve_match("Fresh Hazelnuts", &candidates).unwrap();
        assert_eq!(m.kind, MatchKind::Override);
        assert_eq!(m.product.name, "Hazelnuts");
        assert_eq!(m.confidence, 0.95);
    }

    #[test]
    fn lidl_yogurt_override_needs_no_stored_candidates() {
        let m = resolve_match("LIDL Greek Style Yogurt", &[]).unwrap();
        assert_eq!(m.kind, MatchKind::Override);
        assert_eq!(m.product.days_to_expiry, 21);
        assert_eq!(m.product.storage_type, StorageType::Refrigerated);
        assert!(m.product.store_specific);
    }

    #[test]
    fn correction_smoothing_is_seventy_thirty() {
        let p = product("Greek Yogurt", 10, 0.5);
        let updated = apply_correction(&p, 20);
        // 0.7 * 10 + 0.3 * 20 = 13
        assert_eq!(updated.days_to_expiry, 13);
    }

    #[test]
    fn small_correction_raises_confidence() {
        let p = product("Greek Yogurt", 14, 0.5);
        let updated = apply_correction(&p, 15);
        assert!((updated.confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn large_correction_lowers_confidence() {
        let p = product("Greek Yogurt", 14, 0.5);
        let updated = apply_correction(&p, 30);
        assert!((updated.confidence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn confidence_is_clamped_at_both_bounds() {
        let high = product("A", 14, 0.95);
        assert_eq!(apply_correction(&high, 14).confidence, 1.0);

        let low = product("B", 14, 0.05);
        // Floor at zero is enforced, never negative.
        assert_eq!(apply_correction(&low, 60).confidence, 0.0);
    }

    // Repeating an identical correction must converge, not oscillate: the
    // days value is a fixed point and confidence saturates at 1.0.
    #[test]
    fn identical_correction_converges() {
        let mut p = product("Greek Yogurt", 14, 0.5);
        for _ in 0..10 {
            p = apply_correction(&p, 14);
        }
        assert_eq!(p.days_to_expiry, 14);
        assert_eq!(p.confidence, 1.0);
    }

    #[test]
    fn storage_inference() {
        assert_eq!(infer_storage_type("Frozen Peas", 10), StorageType::Frozen);
        assert_eq!(infer_storage_type("Ice Pops", 90), StorageType::Frozen);
        assert_eq!(
            infer_storage_type("Fresh Basil", 5),
            StorageType::Refrigerated
        );
        assert_eq!(
            infer_storage_type("Chicken Thighs", 3),
            StorageType::Refrigerated
        );
        assert_eq!(
            infer_storage_type("Digestive Biscuits", 30),
            StorageType::RoomTemperature
        );
    }

    // Database-backed. Skipped unless DATABASE_URL points at a test database.
    async fn test_pool() -> Option<sqlx::PgPool> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return None;
        };
        let pool = sqlx::PgPool::connect(&url).await.unwrap();
        sqlx::migrate!("../shared/migrations")
            .run(&pool)
            .await
            .unwrap();
        Some(pool)
    }

    // A correction that resolves to a hard-coded override must not create
    // a learned row, under either the query name or the override's name.
    #[tokio::test]
    async fn correction_against_override_saves_nothing() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let db = FoodDb::new(pool.clone());
        let query = "LIDL Greek Style Yoghurt 500g";
        db.learn_from_correction(query, 21, 5).await;

        for name in [query, "LIDL Greek Style Yogurt"] {
            let (count,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM food_products WHERE LOWER(name) = LOWER($1)")
                    .bind(name)
                    .fetch_one(&pool)
                    .await
                    .unwrap();
            assert_eq!(count, 0, "unexpected learned row for {name}");
        }
    }
}

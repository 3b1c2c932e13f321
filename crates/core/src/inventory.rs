//! Persisted inventory of receipts and items.
//!
//! The only write path for new inventory is `create_receipt`, which runs
//! the receipt insert and the item batch in a single transaction so a
//! failure can never leave an orphaned empty receipt behind.

use serde::Serialize;
use sqlx::PgPool;
use time::{Date, Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::parser::ParsedReceipt;

/// Items expiring within this many days count as "expiring soon".
const EXPIRING_SOON_DAYS: i64 = 3;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Receipt {
    pub id: Uuid,
    pub user_id: Uuid,
    pub store_name: String,
    pub purchase_date: Date,
    pub total_cents: i64,
    pub created_at: OffsetDateTime,
    #[sqlx(skip)]
    pub items: Vec<ReceiptItem>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReceiptItem {
    pub id: Uuid,
    pub receipt_id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub quantity: i32,
    pub purchase_date: Date,
    pub estimated_expiry_date: Date,
    pub category: Option<String>,
    pub vat_code: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DashboardSummary {
    pub expired: i64,
    pub expiring_soon: i64,
    pub fresh: i64,
}

#[derive(Clone)]
pub struct InventoryStore {
    pool: PgPool,
}

impl InventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist a parsed receipt with its items atomically.
    pub async fn create_receipt(
        &self,
        user_id: Uuid,
        parsed: &ParsedReceipt,
    ) -> CoreResult<Receipt> {
        let receipt_id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        let created_at: OffsetDateTime = sqlx::query_scalar(
            r#"
            INSERT INTO receipts (id, user_id, store_name, purchase_date, total_cents, raw_text)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING created_at
            "#,
        )
        .bind(receipt_id)
        .bind(user_id)
        .bind(&parsed.store_name)
        .bind(parsed.purchase_date)
        .bind(parsed.total_cents)
        .bind(&parsed.raw_text)
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(parsed.items.len());
        for item in &parsed.items {
            let item_id = Uuid::new_v4();
            sqlx::query(
                r#"
                INSERT INTO receipt_items
                    (id, receipt_id, name, price_cents, quantity, purchase_date,
                     estimated_expiry_date, category, vat_code)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(item_id)
            .bind(receipt_id)
            .bind(&item.name)
            .bind(item.price_cents)
            .bind(item.quantity)
            .bind(parsed.purchase_date)
            .bind(item.estimated_expiry_date)
            .bind(&item.category)
            .bind(&item.vat_code)
            .execute(&mut *tx)
            .await?;

            items.push(ReceiptItem {
                id: item_id,
                receipt_id,
                name: item.name.clone(),
                price_cents: item.price_cents,
                quantity: item.quantity,
                purchase_date: parsed.purchase_date,
                estimated_expiry_date: item.estimated_expiry_date,
                category: item.category.clone(),
                vat_code: item.vat_code.clone(),
            });
        }

        tx.commit().await?;

        tracing::info!(
            receipt_id = %receipt_id,
            user_id = %user_id,
            store = %parsed.store_name,
            items = items.len(),
            "Receipt persisted"
        );

        Ok(Receipt {
            id: receipt_id,
            user_id,
            store_name: parsed.store_name.clone(),
            purchase_date: parsed.purchase_date,
            total_cents: parsed.total_cents,
            created_at,
            items,
        })
    }

    /// All receipts for a user, newest purchase first, items nested.
    pub async fn list_receipts(&self, user_id: Uuid) -> CoreResult<Vec<Receipt>> {
        let mut receipts: Vec<Receipt> = sqlx::query_as(
            r#"
            SELECT id, user_id, store_name, purchase_date, total_cents, created_at
            FROM receipts
            WHERE user_id = $1
            ORDER BY purchase_date DESC, created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        if receipts.is_empty() {
            return Ok(receipts);
        }

        let ids: Vec<Uuid> = receipts.iter().map(|r| r.id).collect();
        let items: Vec<ReceiptItem> = sqlx::query_as(
            r#"
            SELECT id, receipt_id, name, price_cents, quantity, purchase_date,
                   estimated_expiry_date, category, vat_code
            FROM receipt_items
            WHERE receipt_id = ANY($1)
            ORDER BY name
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        for item in items {
            if let Some(receipt) = receipts.iter_mut().find(|r| r.id == item.receipt_id) {
                receipt.items.push(item);
            }
        }

        Ok(receipts)
    }

    /// Delete a receipt; items cascade.
    pub async fn delete_receipt(&self, user_id: Uuid, receipt_id: Uuid) -> CoreResult<()> {
        let result = sqlx::query("DELETE FROM receipts WHERE id = $1 AND user_id = $2")
            .bind(receipt_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("receipt {receipt_id}")));
        }
        Ok(())
    }

    /// Delete a single item, leaving its receipt in place.
    pub async fn delete_item(&self, user_id: Uuid, item_id: Uuid) -> CoreResult<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM receipt_items i
            USING receipts r
            WHERE i.id = $1 AND i.receipt_id = r.id AND r.user_id = $2
            "#,
        )
        .bind(item_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("item {item_id}")));
        }
        Ok(())
    }

    /// User override of an item's estimated expiry date. Returns the item
    /// as it was before the update so the caller can feed the learning path.
    pub async fn update_item_expiry(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        new_date: Date,
    ) -> CoreResult<ReceiptItem> {
        let previous: Option<ReceiptItem> = sqlx::query_as(
            r#"
            SELECT i.id, i.receipt_id, i.name, i.price_cents, i.quantity,
                   i.purchase_date, i.estimated_expiry_date, i.category, i.vat_code
            FROM receipt_items i
            JOIN receipts r ON r.id = i.receipt_id
            WHERE i.id = $1 AND r.user_id = $2
            "#,
        )
        .bind(item_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let previous = previous.ok_or_else(|| CoreError::NotFound(format!("item {item_id}")))?;

        sqlx::query("UPDATE receipt_items SET estimated_expiry_date = $1 WHERE id = $2")
            .bind(new_date)
            .bind(item_id)
            .execute(&self.pool)
            .await?;

        Ok(previous)
    }

    /// Remove all of a user's items that expired before `today`.
    pub async fn clear_expired(&self, user_id: Uuid, today: Date) -> CoreResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM receipt_items i
            USING receipts r
            WHERE i.receipt_id = r.id
              AND r.user_id = $1
              AND i.estimated_expiry_date < $2
            "#,
        )
        .bind(user_id)
        .bind(today)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Dashboard aggregation: expired / expiring-soon / fresh item counts.
    pub async fn dashboard(&self, user_id: Uuid, today: Date) -> CoreResult<DashboardSummary> {
        let soon = today
            .checked_add(Duration::days(EXPIRING_SOON_DAYS))
            .ok_or_else(|| CoreError::InvalidDate(today.to_string()))?;

        let (expired, expiring_soon, fresh): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE i.estimated_expiry_date < $2),
                COUNT(*) FILTER (WHERE i.estimated_expiry_date >= $2
                                   AND i.estimated_expiry_date <= $3),
                COUNT(*) FILTER (WHERE i.estimated_expiry_date > $3)
            FROM receipt_items i
            JOIN receipts r ON r.id = i.receipt_id
            WHERE r.user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(today)
        .bind(soon)
        .fetch_one(&self.pool)
        .await?;

        Ok(DashboardSummary {
            expired,
            expiring_soon,
            fresh,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParsedItem, ParsedReceipt};
    use crate::predictor::PredictionMethod;
    use time::macros::date;

    // Database-backed. Skipped unless DATABASE_URL points at a test database.
    async fn test_pool() -> Option<PgPool> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return None;
        };
        let pool = PgPool::connect(&url).await.unwrap();
        sqlx::migrate!("../shared/migrations")
            .run(&pool)
            .await
            .unwrap();
        Some(pool)
    }

    fn item(name: &str, price_cents: i64, expiry: Date) -> ParsedItem {
        ParsedItem {
            name: name.to_string(),
            price_cents,
            quantity: 1,
            estimated_expiry_date: expiry,
            category: Some("dairy".to_string()),
            vat_code: Some("A".to_string()),
            confidence: 0.8,
            method: PredictionMethod::Keyword,
        }
    }

    // Every field written by create_receipt must come back unchanged from
    // list_receipts, receipts newest-first and items in name order.
    #[tokio::test]
    async fn receipt_round_trips_through_storage() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let store = InventoryStore::new(pool);
        let user_id = Uuid::new_v4();

        let parsed = ParsedReceipt {
            store_name: "LIDL".to_string(),
            purchase_date: date!(2024 - 06 - 01),
            total_cents: 364,
            raw_text: "LIDL\nGreek Style Yogurt 2.49 A\nSemi Skimmed Milk 1.15 B\nTOTAL 3.64"
                .to_string(),
            items: vec![
                item("Greek Style Yogurt", 249, date!(2024 - 06 - 22)),
                item("Semi Skimmed Milk", 115, date!(2024 - 06 - 08)),
            ],
        };

        let created = store.create_receipt(user_id, &parsed).await.unwrap();
        let listed = store.list_receipts(user_id).await.unwrap();

        assert_eq!(listed.len(), 1);
        let receipt = &listed[0];
        assert_eq!(receipt.id, created.id);
        assert_eq!(receipt.store_name, "LIDL");
        assert_eq!(receipt.purchase_date, date!(2024 - 06 - 01));
        assert_eq!(receipt.total_cents, 364);
        assert_eq!(receipt.created_at, created.created_at);

        assert_eq!(receipt.items.len(), 2);
        let yogurt = &receipt.items[0];
        assert_eq!(yogurt.name, "Greek Style Yogurt");
        assert_eq!(yogurt.price_cents, 249);
        assert_eq!(yogurt.quantity, 1);
        assert_eq!(yogurt.purchase_date, date!(2024 - 06 - 01));
        assert_eq!(yogurt.estimated_expiry_date, date!(2024 - 06 - 22));
        assert_eq!(yogurt.category.as_deref(), Some("dairy"));
        assert_eq!(yogurt.vat_code.as_deref(), Some("A"));
        let milk = &receipt.items[1];
        assert_eq!(milk.name, "Semi Skimmed Milk");
        assert_eq!(milk.estimated_expiry_date, date!(2024 - 06 - 08));
    }

    #[tokio::test]
    async fn deleting_a_receipt_cascades_to_its_items() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let store = InventoryStore::new(pool.clone());
        let user_id = Uuid::new_v4();

        let parsed = single_item_receipt("Oat Bar", date!(2024 - 03 - 02));
        let created = store.create_receipt(user_id, &parsed).await.unwrap();
        store.delete_receipt(user_id, created.id).await.unwrap();

        let (orphans,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM receipt_items WHERE receipt_id = $1")
                .bind(created.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(orphans, 0);
        assert!(store.list_receipts(user_id).await.unwrap().is_empty());
    }

    fn single_item_receipt(name: &str, purchase_date: Date) -> ParsedReceipt {
        ParsedReceipt {
            store_name: "UNKNOWN".to_string(),
            purchase_date,
            total_cents: 100,
            raw_text: format!("{name} 1.00 A"),
            items: vec![item(name, 100, purchase_date)],
        }
    }
}

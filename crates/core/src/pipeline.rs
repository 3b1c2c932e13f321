//! Receipt ingestion pipeline: image -> OCR text -> parse -> persist.
//!
//! The only write path for new inventory. The upload request blocks on the
//! whole chain; there is no background worker and no cancellation of an
//! in-flight extraction.

use uuid::Uuid;

use crate::error::CoreResult;
use crate::inventory::{InventoryStore, Receipt};
use crate::ocr::OcrEngine;
use crate::parser::{ParsedReceipt, ReceiptParser};

pub struct IngestionPipeline<O> {
    ocr: O,
    parser: ReceiptParser,
    inventory: InventoryStore,
}

impl<O: OcrEngine> IngestionPipeline<O> {
    pub fn new(ocr: O, parser: ReceiptParser, inventory: InventoryStore) -> Self {
        Self {
            ocr,
            parser,
            inventory,
        }
    }

    /// Run the full pipeline for one uploaded image. A parse failure
    /// rejects the receipt before anything is written.
    pub async fn ingest(&self, user_id: Uuid, image: &[u8]) -> CoreResult<Receipt> {
        let text = self.ocr.extract_text(image).await?;
        tracing::debug!(user_id = %user_id, chars = text.len(), "OCR extraction complete");

        let parsed = self.parser.parse(&text).await?;
        tracing::info!(
            user_id = %user_id,
            store = %parsed.store_name,
            items = parsed.items.len(),
            "Receipt parsed"
        );

        self.inventory.create_receipt(user_id, &parsed).await
    }

    /// OCR + parse without persisting. Used for dry-run previews.
    pub async fn preview(&self, image: &[u8]) -> CoreResult<ParsedReceipt> {
        let text = self.ocr.extract_text(image).await?;
        self.parser.parse(&text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::ocr::FixedOcr;
    use crate::predictor::ExpiryPredictor;

    // The lazy pool never opens a connection, so these tests fail loudly
    // if anything in the preview path reaches for storage.
    fn pipeline(ocr_text: &str) -> IngestionPipeline<FixedOcr> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        IngestionPipeline::new(
            FixedOcr(ocr_text.to_string()),
            ReceiptParser::new(ExpiryPredictor::keyword_only()),
            InventoryStore::new(pool),
        )
    }

    // A receipt with an unparseable date must fail before any persistence
    // is attempted.
    #[tokio::test]
    async fn bad_date_fails_with_parse_error_before_persist() {
        let pipeline = pipeline("LIDL\nOat Bar 1.00 A\nTOTAL 1.00\nDate: 13/45/99");
        let err = pipeline.preview(b"img").await.unwrap_err();
        assert!(matches!(err, CoreError::Parse(_)));
    }

    #[tokio::test]
    async fn preview_parses_without_touching_storage() {
        let pipeline = pipeline("LIDL\nGreek Style Yogurt 2.49 A\nTOTAL 2.49\nDate: 01/06/24");
        let parsed = pipeline.preview(b"img").await.unwrap();
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.total_cents, 249);
    }
}

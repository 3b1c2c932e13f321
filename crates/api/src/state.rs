//! Application state

use std::sync::Arc;

use sqlx::PgPool;

use shelfwise_billing::BillingService;
use shelfwise_core::{
    AiClassifier, ExpiryPredictor, FoodDb, HttpOcrClient, IngestionPipeline, InventoryStore,
    ReceiptParser,
};

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub inventory: InventoryStore,
    pub food_db: FoodDb,
    pub pipeline: Arc<IngestionPipeline<HttpOcrClient>>,
    /// Billing is optional: without Stripe configuration the receipt
    /// pipeline still runs, billing routes return errors.
    pub billing: Option<Arc<BillingService>>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let inventory = InventoryStore::new(pool.clone());
        let food_db = FoodDb::new(pool.clone());

        let ai = config.ai_classifier_endpoint.clone().map(|endpoint| {
            tracing::info!("AI-assisted classification enabled");
            AiClassifier::new(endpoint, config.ai_classifier_api_key.clone())
        });
        if ai.is_none() {
            tracing::info!("AI classifier not configured; keyword classification only");
        }

        let predictor = ExpiryPredictor::new(Some(food_db.clone()), ai);
        let ocr = HttpOcrClient::new(config.ocr_endpoint.clone(), config.ocr_api_key.clone());
        let pipeline = Arc::new(IngestionPipeline::new(
            ocr,
            ReceiptParser::new(predictor),
            inventory.clone(),
        ));

        let billing = match BillingService::from_env(pool.clone()) {
            Ok(svc) => {
                tracing::info!("Stripe billing service initialized");
                Some(Arc::new(svc))
            }
            Err(e) => {
                tracing::warn!("Stripe billing not configured: {}", e);
                None
            }
        };

        Self {
            pool,
            config,
            inventory,
            food_db,
            pipeline,
            billing,
        }
    }

    /// Billing service or a consistent error for every billing route.
    pub fn billing(&self) -> Result<&Arc<BillingService>, crate::error::ApiError> {
        self.billing
            .as_ref()
            .ok_or_else(|| crate::error::ApiError::Internal("billing not configured".to_string()))
    }
}

//! Route table.

use axum::routing::{delete, get, patch, post};
use axum::Router;

use crate::state::AppState;

pub mod billing;
pub mod receipts;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Inventory
        .route("/api/receipts", post(receipts::upload_receipt))
        .route("/api/receipts", get(receipts::list_receipts))
        .route("/api/receipts/{id}", delete(receipts::delete_receipt))
        .route("/api/items/{id}", delete(receipts::delete_item))
        .route("/api/items/{id}/expiry", patch(receipts::update_item_expiry))
        .route("/api/items/clear-expired", post(receipts::clear_expired))
        .route("/api/dashboard", get(receipts::dashboard))
        // Billing
        .route("/api/billing/checkout", post(billing::create_checkout))
        .route("/api/billing/portal", post(billing::create_portal))
        .route("/api/billing/sync", post(billing::sync_subscription))
        .route("/api/billing/status", get(billing::subscription_status))
        .route("/api/stripe/webhook", post(billing::stripe_webhook))
        // Support remediation
        .route(
            "/api/admin/subscriptions/activate",
            post(billing::admin_activate),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

//! Receipt and inventory routes.

use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Iso8601;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use shelfwise_core::{DashboardSummary, Receipt};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `POST /api/receipts` — multipart image upload through the full
/// OCR → parse → predict → persist pipeline. The request blocks until the
/// receipt and its items are committed.
pub async fn upload_receipt(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> ApiResult<Json<Receipt>> {
    let mut image: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("image") | Some("file") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?;
                image = Some(bytes.to_vec());
            }
            _ => {}
        }
    }

    let image = image.ok_or_else(|| ApiError::BadRequest("missing image field".to_string()))?;
    if image.is_empty() {
        return Err(ApiError::BadRequest("empty image upload".to_string()));
    }

    let receipt = state.pipeline.ingest(user.user_id, &image).await?;

    tracing::info!(
        user_id = %user.user_id,
        receipt_id = %receipt.id,
        items = receipt.items.len(),
        "Receipt ingested"
    );

    Ok(Json(receipt))
}

/// `GET /api/receipts` — the user's receipts, newest first, items nested.
pub async fn list_receipts(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<Receipt>>> {
    let receipts = state.inventory.list_receipts(user.user_id).await?;
    Ok(Json(receipts))
}

pub async fn delete_receipt(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.inventory.delete_receipt(user.user_id, id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

pub async fn delete_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.inventory.delete_item(user.user_id, id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateExpiryRequest {
    /// ISO date, e.g. `2024-06-22`.
    pub new_date: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateExpiryResponse {
    pub item_id: Uuid,
    pub estimated_expiry_date: Date,
}

/// `PATCH /api/items/{id}/expiry` — user override of a predicted expiry.
/// The correction also feeds the learned food database, best-effort.
pub async fn update_item_expiry(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateExpiryRequest>,
) -> ApiResult<Json<UpdateExpiryResponse>> {
    let new_date = Date::parse(&body.new_date, &Iso8601::DEFAULT)
        .map_err(|_| ApiError::BadRequest(format!("invalid date: {}", body.new_date)))?;

    let previous = state
        .inventory
        .update_item_expiry(user.user_id, id, new_date)
        .await?;

    let original_days = (previous.estimated_expiry_date - previous.purchase_date).whole_days();
    let corrected_days = (new_date - previous.purchase_date).whole_days();
    state
        .food_db
        .learn_from_correction(&previous.name, original_days, corrected_days)
        .await;

    Ok(Json(UpdateExpiryResponse {
        item_id: id,
        estimated_expiry_date: new_date,
    }))
}

pub async fn clear_expired(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    let today = OffsetDateTime::now_utc().date();
    let removed = state.inventory.clear_expired(user.user_id, today).await?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

pub async fn dashboard(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<DashboardSummary>> {
    let today = OffsetDateTime::now_utc().date();
    let summary = state.inventory.dashboard(user.user_id, today).await?;
    Ok(Json(summary))
}

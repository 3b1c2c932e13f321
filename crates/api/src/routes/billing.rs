//! Billing and webhook routes.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shelfwise_billing::{BillingError, CheckoutSessionInfo, SubscriptionRecord};

use crate::auth::{require_admin, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `POST /api/billing/checkout` — start a premium subscription purchase.
pub async fn create_checkout(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<CheckoutSessionInfo>> {
    let billing = state.billing()?;
    let session = billing
        .checkout
        .create_session(Some(user.user_id), user.email.as_deref())
        .await?;
    Ok(Json(session))
}

#[derive(Debug, Serialize)]
pub struct PortalResponse {
    pub url: String,
}

/// `POST /api/billing/portal` — manage an existing subscription.
pub async fn create_portal(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<PortalResponse>> {
    let billing = state.billing()?;

    let record = billing.subscriptions.get_status(user.user_id).await?;
    let customer_id = record
        .and_then(|r| r.stripe_customer_id)
        .ok_or_else(|| ApiError::Billing(BillingError::CustomerNotFound(user.user_id.to_string())))?;

    let url = billing.portal.create_session(&customer_id).await?;
    Ok(Json(PortalResponse { url }))
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /api/billing/sync` — client-triggered reconciliation with the
/// provider, for delayed or missed webhooks. Always answers with the
/// `{success, subscription?, error?}` shape.
pub async fn sync_subscription(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<SyncResponse>> {
    let billing = state.billing()?;

    let email = user
        .email
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("sync requires a verified email".to_string()))?;

    let response = match billing
        .subscriptions
        .sync_from_provider(user.user_id, email)
        .await
    {
        Ok(record) => SyncResponse {
            success: true,
            subscription: record,
            error: None,
        },
        Err(e) => {
            tracing::error!(user_id = %user.user_id, error = %e, "Subscription sync failed");
            SyncResponse {
                success: false,
                subscription: None,
                error: Some(e.to_string()),
            }
        }
    };

    Ok(Json(response))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub premium: bool,
    pub trial_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionRecord>,
}

/// `GET /api/billing/status` — premium gate. An absent record or a lookup
/// failure degrades to "not premium" rather than erroring.
pub async fn subscription_status(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<StatusResponse>> {
    let billing = state.billing()?;

    let record = match billing.subscriptions.get_status(user.user_id).await {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(user_id = %user.user_id, error = %e, "Status lookup failed");
            None
        }
    };

    let premium = record
        .as_ref()
        .map(|r| r.status.is_premium())
        .unwrap_or(false);

    let trial_used = billing
        .subscriptions
        .trial_used(user.user_id)
        .await
        .unwrap_or(false);

    Ok(Json(StatusResponse {
        premium,
        trial_used,
        subscription: record,
    }))
}

/// `POST /api/stripe/webhook` — raw body plus `Stripe-Signature` header.
/// Verification failures get a client error with no state change; once
/// verified, the delivery is always acknowledged.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<serde_json::Value>> {
    let billing = state.billing()?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing Stripe-Signature header".to_string()))?;

    let event = billing.webhooks.verify_event(&body, signature)?;
    billing.webhooks.handle_event(event).await?;

    Ok(Json(serde_json::json!({ "received": true })))
}

#[derive(Debug, Deserialize)]
pub struct AdminActivateRequest {
    pub user_id: Uuid,
    pub stripe_customer_id: String,
    pub stripe_subscription_id: String,
}

/// `POST /api/admin/subscriptions/activate` — support remediation only.
pub async fn admin_activate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AdminActivateRequest>,
) -> ApiResult<Json<SubscriptionRecord>> {
    require_admin(&headers, &state)?;

    let billing = state.billing()?;
    let record = billing
        .subscriptions
        .force_activate(
            body.user_id,
            &body.stripe_customer_id,
            &body.stripe_subscription_id,
        )
        .await?;

    Ok(Json(record))
}

//! Request identity.
//!
//! Identity is delegated to an external provider sitting in front of this
//! service; the API trusts its verified-identity headers. The extractor
//! only validates shape, never credentials.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated caller, resolved from `x-user-id` / `x-user-email`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .ok_or(ApiError::Unauthorized)?;

        let email = parts
            .headers
            .get("x-user-email")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        Ok(AuthUser { user_id, email })
    }
}

/// Gate for the admin remediation endpoint. Compares `x-admin-token`
/// against the configured shared secret; an unconfigured secret disables
/// the endpoint entirely.
pub fn require_admin(parts: &axum::http::HeaderMap, state: &AppState) -> Result<(), ApiError> {
    let Some(expected) = state.config.admin_token.as_deref() else {
        tracing::warn!("Admin endpoint called but ADMIN_TOKEN is not configured");
        return Err(ApiError::Forbidden);
    };

    let provided = parts
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    if provided != expected {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

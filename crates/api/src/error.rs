//! API error type and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use shelfwise_billing::BillingError;
use shelfwise_core::CoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Billing(#[from] BillingError),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Core(CoreError::Parse(_)) | ApiError::Core(CoreError::InvalidDate(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Core(CoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Core(CoreError::Ocr(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Core(CoreError::Database(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Billing(BillingError::WebhookSignatureInvalid) => StatusCode::BAD_REQUEST,
            ApiError::Billing(BillingError::WebhookEventNotSupported(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Billing(BillingError::CustomerNotFound(_))
            | ApiError::Billing(BillingError::SubscriptionNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Billing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "Request rejected");
        }

        // Internal details stay in the logs; clients get the category only.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_map_to_422() {
        let err = ApiError::Core(CoreError::Parse("no date line".into()));
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let err = ApiError::Core(CoreError::InvalidDate("13/45/99".into()));
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn signature_failures_map_to_400() {
        let err = ApiError::Billing(BillingError::WebhookSignatureInvalid);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_resources_map_to_404() {
        let err = ApiError::Core(CoreError::NotFound("item x".into()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}

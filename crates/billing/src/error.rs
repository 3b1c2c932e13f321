//! Billing error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("stripe api error: {0}")]
    Stripe(#[from] stripe::StripeError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Signature invalid or malformed. The webhook endpoint maps this to a
    /// client error and performs no state change.
    #[error("webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("unexpected webhook payload: {0}")]
    WebhookEventNotSupported(String),

    /// Provider state could not be verified during an explicit sync. Hard
    /// error by design: staleness must be surfaced, never papered over
    /// with local data.
    #[error("provider verification failed: {0}")]
    ProviderVerification(String),

    #[error("no stripe customer found for {0}")]
    CustomerNotFound(String),

    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("billing configuration error: {0}")]
    Config(String),

    #[error("internal billing error: {0}")]
    Internal(String),
}

pub type BillingResult<T> = Result<T, BillingError>;

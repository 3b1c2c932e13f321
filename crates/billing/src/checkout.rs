//! Checkout session creation for the premium subscription.

use stripe::{
    CheckoutSession, CheckoutSessionMode, CreateCheckoutSession, CreateCheckoutSessionLineItems,
};
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// What the frontend needs to send the user into Stripe Checkout.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckoutSessionInfo {
    pub session_id: String,
    pub url: String,
}

pub struct CheckoutService {
    stripe: StripeClient,
}

impl CheckoutService {
    pub fn new(stripe: StripeClient) -> Self {
        Self { stripe }
    }

    /// Create a subscription-mode checkout session for the premium price.
    ///
    /// The user id travels in session metadata so the completion webhook
    /// can attach the resulting subscription to the right local record.
    /// An anonymous session gets `"guest"` and is reconciled later by
    /// email via the sync path.
    pub async fn create_session(
        &self,
        user_id: Option<Uuid>,
        email: Option<&str>,
    ) -> BillingResult<CheckoutSessionInfo> {
        let config = self.stripe.config();

        let mut metadata = std::collections::HashMap::new();
        metadata.insert(
            "user_id".to_string(),
            user_id.map_or_else(|| "guest".to_string(), |id| id.to_string()),
        );

        let params = CreateCheckoutSession {
            mode: Some(CheckoutSessionMode::Subscription),
            line_items: Some(vec![CreateCheckoutSessionLineItems {
                price: Some(config.premium_price_id.clone()),
                quantity: Some(1),
                ..Default::default()
            }]),
            success_url: Some(&config.checkout_success_url),
            cancel_url: Some(&config.checkout_cancel_url),
            customer_email: email,
            metadata: Some(metadata),
            ..Default::default()
        };

        let session = CheckoutSession::create(self.stripe.inner(), params).await?;

        let url = session
            .url
            .ok_or_else(|| BillingError::Internal("checkout session has no URL".to_string()))?;

        tracing::info!(
            session_id = %session.id,
            user_id = ?user_id,
            "Created checkout session"
        );

        Ok(CheckoutSessionInfo {
            session_id: session.id.to_string(),
            url,
        })
    }
}

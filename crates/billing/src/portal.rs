//! Stripe customer portal sessions.

use stripe::{BillingPortalSession, CreateBillingPortalSession, CustomerId};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

pub struct PortalService {
    stripe: StripeClient,
}

impl PortalService {
    pub fn new(stripe: StripeClient) -> Self {
        Self { stripe }
    }

    /// Create a portal session so an existing customer can manage their
    /// subscription (change payment method, cancel) on Stripe's side.
    pub async fn create_session(&self, customer_id: &str) -> BillingResult<String> {
        let customer_id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::CustomerNotFound(format!("{customer_id}: {e}")))?;

        let mut params = CreateBillingPortalSession::new(customer_id);
        params.return_url = Some(&self.stripe.config().portal_return_url);

        let session = BillingPortalSession::create(self.stripe.inner(), params).await?;

        Ok(session.url)
    }
}

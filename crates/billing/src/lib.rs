// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Shelfwise billing
//!
//! Stripe integration for the premium subscription: checkout, customer
//! portal, webhook processing, and reconciliation of the local
//! subscription record with Stripe's view.

pub mod checkout;
pub mod client;
pub mod error;
pub mod portal;
pub mod subscriptions;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

pub use checkout::{CheckoutService, CheckoutSessionInfo};
pub use client::{StripeClient, StripeConfig};
pub use error::{BillingError, BillingResult};
pub use portal::PortalService;
pub use subscriptions::{map_stripe_status, SubscriptionRecord, SubscriptionService};
pub use webhooks::{EventDedup, WebhookHandler};

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub checkout: CheckoutService,
    pub portal: PortalService,
    pub subscriptions: SubscriptionService,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let stripe = StripeClient::from_env()?;
        Ok(Self::build(stripe, pool))
    }

    /// Create a new billing service with explicit config
    pub fn new(config: StripeConfig, pool: PgPool) -> Self {
        Self::build(StripeClient::new(config), pool)
    }

    fn build(stripe: StripeClient, pool: PgPool) -> Self {
        Self {
            checkout: CheckoutService::new(stripe.clone()),
            portal: PortalService::new(stripe.clone()),
            subscriptions: SubscriptionService::new(stripe.clone(), pool.clone()),
            webhooks: WebhookHandler::new(stripe, pool),
        }
    }
}

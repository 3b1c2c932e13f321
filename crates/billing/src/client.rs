//! Stripe client and configuration.

use std::sync::Arc;

use crate::error::{BillingError, BillingResult};

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    /// Price id of the premium subscription.
    pub premium_price_id: String,
    pub checkout_success_url: String,
    pub checkout_cancel_url: String,
    pub portal_return_url: String,
}

impl StripeConfig {
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            secret_key: require("STRIPE_SECRET_KEY")?,
            webhook_secret: require("STRIPE_WEBHOOK_SECRET")?,
            premium_price_id: require("STRIPE_PREMIUM_PRICE_ID")?,
            checkout_success_url: require("CHECKOUT_SUCCESS_URL")?,
            checkout_cancel_url: require("CHECKOUT_CANCEL_URL")?,
            portal_return_url: require("PORTAL_RETURN_URL")?,
        })
    }
}

fn require(name: &str) -> BillingResult<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BillingError::Config(format!("{name} not set")))
}

/// Cloneable wrapper around the Stripe SDK client plus our config.
#[derive(Clone)]
pub struct StripeClient {
    inner: stripe::Client,
    config: Arc<StripeConfig>,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let inner = stripe::Client::new(config.secret_key.clone());
        Self {
            inner,
            config: Arc::new(config),
        }
    }

    pub fn from_env() -> BillingResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?))
    }

    pub fn inner(&self) -> &stripe::Client {
        &self.inner
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

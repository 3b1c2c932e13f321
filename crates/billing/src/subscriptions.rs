//! Subscription reconciliation.
//!
//! One state machine keeps the local subscription record consistent with
//! Stripe's view. Three transition sources, in precedence order: webhook
//! events (push, authoritative), client-triggered sync (pull, for delayed
//! or missed webhooks), and administrative override (manual, support
//! remediation only). All three converge on a single atomic upsert keyed
//! by user id, so concurrent writers cannot create duplicate rows.

use sqlx::PgPool;
use stripe::{
    Customer, CustomerId, ListCustomers, ListSubscriptions, Subscription, SubscriptionId,
    SubscriptionStatus as StripeSubStatus,
};
use time::OffsetDateTime;
use uuid::Uuid;

use shelfwise_shared::SubscriptionStatus;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// Local view of a user's subscription. Exactly one row per user; rows are
/// never deleted, only status-transitioned.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SubscriptionRecord {
    pub user_id: Uuid,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub status: SubscriptionStatus,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    user_id: Uuid,
    stripe_customer_id: Option<String>,
    stripe_subscription_id: Option<String>,
    status: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<SubscriptionRow> for SubscriptionRecord {
    fn from(row: SubscriptionRow) -> Self {
        SubscriptionRecord {
            user_id: row.user_id,
            stripe_customer_id: row.stripe_customer_id,
            stripe_subscription_id: row.stripe_subscription_id,
            status: SubscriptionStatus::parse(&row.status),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Map a Stripe status onto the local enum. Stripe's `paused` has no local
/// counterpart and maps to `incomplete` (non-premium).
pub fn map_stripe_status(status: StripeSubStatus) -> SubscriptionStatus {
    match status {
        StripeSubStatus::Active => SubscriptionStatus::Active,
        StripeSubStatus::Trialing => SubscriptionStatus::Trialing,
        StripeSubStatus::PastDue => SubscriptionStatus::PastDue,
        StripeSubStatus::Canceled => SubscriptionStatus::Canceled,
        StripeSubStatus::Unpaid => SubscriptionStatus::Unpaid,
        StripeSubStatus::Incomplete => SubscriptionStatus::Incomplete,
        StripeSubStatus::IncompleteExpired => SubscriptionStatus::IncompleteExpired,
        StripeSubStatus::Paused => SubscriptionStatus::Incomplete,
    }
}

pub struct SubscriptionService {
    stripe: StripeClient,
    pool: PgPool,
}

impl SubscriptionService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// The single upsert primitive all reconciliation paths go through.
    ///
    /// `INSERT .. ON CONFLICT (user_id) DO UPDATE` is atomic per row, so a
    /// webhook and a client sync racing for the same user converge on one
    /// record whose status is the most recently written value. A brand-new
    /// subscription after a canceled one reuses the same row.
    pub async fn upsert_subscription(
        &self,
        user_id: Uuid,
        customer_id: Option<&str>,
        subscription_id: Option<&str>,
        status: SubscriptionStatus,
    ) -> BillingResult<SubscriptionRecord> {
        let row: SubscriptionRow = sqlx::query_as(
            r#"
            INSERT INTO subscriptions
                (id, user_id, stripe_customer_id, stripe_subscription_id, status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE SET
                stripe_customer_id = COALESCE(EXCLUDED.stripe_customer_id,
                                              subscriptions.stripe_customer_id),
                stripe_subscription_id = COALESCE(EXCLUDED.stripe_subscription_id,
                                                  subscriptions.stripe_subscription_id),
                status = EXCLUDED.status,
                updated_at = NOW()
            RETURNING user_id, stripe_customer_id, stripe_subscription_id,
                      status, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(customer_id)
        .bind(subscription_id)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;

        let record = SubscriptionRecord::from(row);

        // Trial bookkeeping moves in lockstep: once a subscription reaches
        // a premium status the trial is spent and cannot be re-granted.
        if record.status.is_premium() {
            self.mark_trial_used(user_id).await?;
        }

        tracing::info!(
            user_id = %user_id,
            status = %record.status,
            "Subscription record upserted"
        );

        Ok(record)
    }

    /// Single status query used by everything that gates premium features.
    pub async fn get_status(&self, user_id: Uuid) -> BillingResult<Option<SubscriptionRecord>> {
        let row: Option<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT user_id, stripe_customer_id, stripe_subscription_id,
                   status, created_at, updated_at
            FROM subscriptions
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SubscriptionRecord::from))
    }

    /// Look up the local record that references a Stripe customer. Webhook
    /// handlers use this to resolve events back to a user.
    pub async fn record_for_customer(
        &self,
        customer_id: &str,
    ) -> BillingResult<Option<SubscriptionRecord>> {
        let row: Option<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT user_id, stripe_customer_id, stripe_subscription_id,
                   status, created_at, updated_at
            FROM subscriptions
            WHERE stripe_customer_id = $1
            "#,
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SubscriptionRecord::from))
    }

    pub async fn mark_trial_used(&self, user_id: Uuid) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO trials (user_id, trial_used, trial_started_at)
            VALUES ($1, TRUE, NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                trial_used = TRUE,
                trial_started_at = COALESCE(trials.trial_started_at, NOW())
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn trial_used(&self, user_id: Uuid) -> BillingResult<bool> {
        let used: Option<(bool,)> =
            sqlx::query_as("SELECT trial_used FROM trials WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(used.map(|(u,)| u).unwrap_or(false))
    }

    /// Client-triggered sync (pull path) for when webhook delivery is
    /// delayed or missed.
    ///
    /// Finds the provider customer by email and adopts their most recent
    /// subscription. If the provider has a customer but no subscription
    /// while the local record was previously active-like, the local record
    /// is forced to `canceled` so an externally cancelled subscription
    /// cannot linger as premium. If no provider customer exists but the
    /// local record references a subscription id, that id is re-verified
    /// directly; verification failure aborts the sync with a hard error
    /// rather than silently keeping stale state.
    pub async fn sync_from_provider(
        &self,
        user_id: Uuid,
        email: &str,
    ) -> BillingResult<Option<SubscriptionRecord>> {
        let customers = Customer::list(
            self.stripe.inner(),
            &ListCustomers {
                email: Some(email),
                ..Default::default()
            },
        )
        .await?;

        if let Some(customer) = customers.data.first() {
            let customer_id = customer.id.to_string();
            let subscriptions = self.list_provider_subscriptions(&customer.id).await?;

            if let Some(latest) = subscriptions.into_iter().max_by_key(|s| s.created) {
                let record = self
                    .upsert_subscription(
                        user_id,
                        Some(&customer_id),
                        Some(latest.id.as_str()),
                        map_stripe_status(latest.status),
                    )
                    .await?;
                tracing::info!(
                    user_id = %user_id,
                    status = %record.status,
                    "Synced subscription from provider"
                );
                return Ok(Some(record));
            }

            return self.cancel_if_orphaned(user_id, &customer_id).await;
        }

        match self.get_status(user_id).await? {
            Some(local) => {
                let Some(sub_id) = local.stripe_subscription_id.clone() else {
                    return Ok(Some(local));
                };
                let verified = self.retrieve_subscription(&sub_id).await.map_err(|e| {
                    BillingError::ProviderVerification(format!(
                        "could not re-verify subscription {sub_id}: {e}"
                    ))
                })?;
                let record = self
                    .upsert_subscription(
                        user_id,
                        local.stripe_customer_id.as_deref(),
                        Some(sub_id.as_str()),
                        map_stripe_status(verified.status),
                    )
                    .await?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn cancel_if_orphaned(
        &self,
        user_id: Uuid,
        customer_id: &str,
    ) -> BillingResult<Option<SubscriptionRecord>> {
        match self.get_status(user_id).await? {
            Some(local) if local.status.was_active_like() => {
                tracing::warn!(
                    user_id = %user_id,
                    previous_status = %local.status,
                    "Provider has no subscription for a previously active record; forcing canceled"
                );
                let record = self
                    .upsert_subscription(
                        user_id,
                        Some(customer_id),
                        local.stripe_subscription_id.as_deref(),
                        SubscriptionStatus::Canceled,
                    )
                    .await?;
                Ok(Some(record))
            }
            other => Ok(other),
        }
    }

    /// Administrative override: force-activate without provider
    /// verification. Support remediation only, hence the loud log line.
    pub async fn force_activate(
        &self,
        user_id: Uuid,
        customer_id: &str,
        subscription_id: &str,
    ) -> BillingResult<SubscriptionRecord> {
        tracing::warn!(
            user_id = %user_id,
            customer_id = %customer_id,
            subscription_id = %subscription_id,
            "EMERGENCY PATH: forcing subscription active without provider verification"
        );
        self.upsert_subscription(
            user_id,
            Some(customer_id),
            Some(subscription_id),
            SubscriptionStatus::Active,
        )
        .await
    }

    async fn list_provider_subscriptions(
        &self,
        customer_id: &CustomerId,
    ) -> BillingResult<Vec<Subscription>> {
        let params = ListSubscriptions {
            customer: Some(customer_id.clone()),
            ..Default::default()
        };
        let subscriptions = Subscription::list(self.stripe.inner(), &params).await?;
        Ok(subscriptions.data)
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> BillingResult<Subscription> {
        let sub_id = subscription_id
            .parse::<SubscriptionId>()
            .map_err(|e| BillingError::SubscriptionNotFound(format!("{subscription_id}: {e}")))?;
        Ok(Subscription::retrieve(self.stripe.inner(), &sub_id, &[]).await?)
    }
}

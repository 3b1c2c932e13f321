//! Stripe webhook handling.
//!
//! Verifies event signatures, deduplicates deliveries, and applies
//! subscription lifecycle events to the local record via the
//! reconciliation upsert.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use stripe::{Event, EventObject, EventType, Webhook};
use uuid::Uuid;

use shelfwise_shared::SubscriptionStatus;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::subscriptions::{map_stripe_status, SubscriptionService};

type HmacSha256 = Hmac<Sha256>;

/// Bound on remembered event ids. Stripe retries span hours, not days,
/// so a few thousand recent ids is ample.
const DEDUP_CAPACITY: usize = 1024;

/// In-memory, bounded set of recently seen event ids.
///
/// Oldest-first eviction once the capacity is reached. A process restart
/// forgets the set, which is acceptable: every handler is idempotent at
/// the database level, so a re-delivered event is harmless.
pub struct EventDedup {
    inner: Mutex<(HashSet<String>, VecDeque<String>)>,
    capacity: usize,
}

impl EventDedup {
    pub fn new() -> Self {
        Self::with_capacity(DEDUP_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new((HashSet::new(), VecDeque::new())),
            capacity,
        }
    }

    /// Returns `true` if the event id is new and was recorded, `false`
    /// if it was already seen.
    pub fn check_and_insert(&self, event_id: &str) -> bool {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            // A poisoned lock only means another thread panicked mid-insert;
            // the set is still usable.
            Err(poisoned) => poisoned.into_inner(),
        };
        let (seen, order) = &mut *guard;

        if seen.contains(event_id) {
            return false;
        }

        if order.len() >= self.capacity {
            if let Some(oldest) = order.pop_front() {
                seen.remove(&oldest);
            }
        }

        seen.insert(event_id.to_string());
        order.push_back(event_id.to_string());
        true
    }
}

impl Default for EventDedup {
    fn default() -> Self {
        Self::new()
    }
}

/// Parsed `Stripe-Signature` header: `t=<timestamp>,v1=<hex hmac>,..`.
struct SignatureHeader {
    timestamp: i64,
    v1: String,
}

fn parse_signature_header(signature: &str) -> BillingResult<SignatureHeader> {
    let mut timestamp: Option<i64> = None;
    let mut v1: Option<String> = None;

    for part in signature.split(',') {
        let kv: Vec<&str> = part.splitn(2, '=').collect();
        if kv.len() == 2 {
            match kv[0].trim() {
                "t" => timestamp = kv[1].parse().ok(),
                "v1" => v1 = Some(kv[1].to_string()),
                _ => {}
            }
        }
    }

    let timestamp = timestamp.ok_or(BillingError::WebhookSignatureInvalid)?;
    let v1 = v1.ok_or(BillingError::WebhookSignatureInvalid)?;
    Ok(SignatureHeader { timestamp, v1 })
}

/// Webhook handler for Stripe subscription lifecycle events.
pub struct WebhookHandler {
    stripe: StripeClient,
    pool: PgPool,
    dedup: EventDedup,
}

impl WebhookHandler {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self {
            stripe,
            pool,
            dedup: EventDedup::new(),
        }
    }

    fn subscriptions(&self) -> SubscriptionService {
        SubscriptionService::new(self.stripe.clone(), self.pool.clone())
    }

    /// Verify and parse a Stripe webhook event.
    ///
    /// Tries the library's verifier first, then falls back to manual
    /// signature verification. The manual path exists because newer Stripe
    /// API versions ship event payloads the pinned library version rejects
    /// during deserialization inside `construct_event`, even when the
    /// signature itself is fine.
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<Event> {
        let webhook_secret = &self.stripe.config().webhook_secret;

        match Webhook::construct_event(payload, signature, webhook_secret) {
            Ok(event) => return Ok(event),
            Err(e) => {
                tracing::debug!(
                    stripe_error = %e,
                    "Standard webhook parsing failed, trying manual verification"
                );
            }
        }

        let header = parse_signature_header(signature)?;

        // 5 minute replay tolerance, same as the library default.
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|_| BillingError::WebhookSignatureInvalid)?
            .as_secs() as i64;

        if (now - header.timestamp).abs() > 300 {
            tracing::warn!(
                timestamp = header.timestamp,
                now = now,
                "Webhook timestamp outside tolerance"
            );
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let signed_payload = format!("{}.{}", header.timestamp, payload);
        let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes())
            .map_err(|_| BillingError::WebhookSignatureInvalid)?;
        mac.update(signed_payload.as_bytes());
        let computed = hex::encode(mac.finalize().into_bytes());

        if computed != header.v1 {
            tracing::warn!("Webhook signature mismatch");
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let event: Event = serde_json::from_str(payload).map_err(|e| {
            tracing::error!(parse_error = %e, "Verified webhook payload failed to parse");
            BillingError::WebhookSignatureInvalid
        })?;

        tracing::debug!(
            event_type = %event.type_,
            event_id = %event.id,
            "Manual webhook verification succeeded"
        );

        Ok(event)
    }

    /// Apply a verified event.
    ///
    /// Duplicate deliveries are dropped here. Handler failures are logged
    /// but not returned: once the signature checked out, the endpoint
    /// acknowledges the delivery so Stripe does not retry an event our
    /// side will never accept. The underlying upserts are idempotent, so
    /// the next lifecycle event or a client sync repairs any missed state.
    pub async fn handle_event(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();

        if !self.dedup.check_and_insert(&event_id) {
            tracing::info!(event_id = %event_id, "Duplicate webhook event, skipping");
            return Ok(());
        }

        tracing::info!(
            event_type = %event.type_,
            event_id = %event_id,
            "Processing Stripe webhook event"
        );

        let result = match event.type_ {
            EventType::CheckoutSessionCompleted => self.handle_checkout_completed(event).await,
            EventType::CustomerSubscriptionCreated | EventType::CustomerSubscriptionUpdated => {
                self.handle_subscription_changed(event).await
            }
            EventType::CustomerSubscriptionDeleted => self.handle_subscription_deleted(event).await,
            other => {
                tracing::debug!(event_type = %other, "Ignoring unhandled webhook event type");
                Ok(())
            }
        };

        if let Err(e) = result {
            tracing::error!(
                event_id = %event_id,
                error = %e,
                "Webhook handler failed; acknowledging delivery anyway"
            );
        }

        Ok(())
    }

    async fn handle_checkout_completed(&self, event: Event) -> BillingResult<()> {
        let session = match event.data.object {
            EventObject::CheckoutSession(session) => session,
            _ => {
                return Err(BillingError::WebhookEventNotSupported(
                    "expected CheckoutSession".to_string(),
                ))
            }
        };

        let Some(user_id) = session
            .metadata
            .as_ref()
            .and_then(|m| m.get("user_id"))
            .and_then(|raw| Uuid::parse_str(raw).ok())
        else {
            // Guest checkout; the record is attached later by email sync.
            tracing::info!(
                session_id = %session.id,
                "Checkout completed without a user id in metadata"
            );
            return Ok(());
        };

        let customer_id = session.customer.as_ref().map(|c| c.id().to_string());
        let subscription_id = session.subscription.as_ref().map(|s| s.id().to_string());

        self.subscriptions()
            .upsert_subscription(
                user_id,
                customer_id.as_deref(),
                subscription_id.as_deref(),
                SubscriptionStatus::Active,
            )
            .await?;

        tracing::info!(
            user_id = %user_id,
            session_id = %session.id,
            "Checkout completed, subscription activated"
        );

        Ok(())
    }

    async fn handle_subscription_changed(&self, event: Event) -> BillingResult<()> {
        let subscription = self.extract_subscription(event)?;
        let customer_id = subscription.customer.id().to_string();
        let status = map_stripe_status(subscription.status);

        let Some(user_id) = self.resolve_user(&subscription.metadata, &customer_id).await? else {
            tracing::warn!(
                customer_id = %customer_id,
                subscription_id = %subscription.id,
                "No local record for subscription event; waiting for checkout or sync"
            );
            return Ok(());
        };

        self.subscriptions()
            .upsert_subscription(
                user_id,
                Some(&customer_id),
                Some(subscription.id.as_str()),
                status,
            )
            .await?;

        tracing::info!(
            user_id = %user_id,
            subscription_id = %subscription.id,
            status = %status,
            "Subscription state applied from webhook"
        );

        Ok(())
    }

    async fn handle_subscription_deleted(&self, event: Event) -> BillingResult<()> {
        let subscription = self.extract_subscription(event)?;
        let customer_id = subscription.customer.id().to_string();

        let Some(user_id) = self.resolve_user(&subscription.metadata, &customer_id).await? else {
            tracing::warn!(
                customer_id = %customer_id,
                "Subscription deleted for unknown customer"
            );
            return Ok(());
        };

        // Status flips to canceled; the subscription id stays on the row
        // as a reference to what was cancelled.
        self.subscriptions()
            .upsert_subscription(
                user_id,
                Some(&customer_id),
                Some(subscription.id.as_str()),
                SubscriptionStatus::Canceled,
            )
            .await?;

        tracing::info!(
            user_id = %user_id,
            subscription_id = %subscription.id,
            "Subscription canceled from webhook"
        );

        Ok(())
    }

    fn extract_subscription(&self, event: Event) -> BillingResult<stripe::Subscription> {
        match event.data.object {
            EventObject::Subscription(subscription) => Ok(subscription),
            _ => Err(BillingError::WebhookEventNotSupported(
                "expected Subscription".to_string(),
            )),
        }
    }

    /// Locate the local user for a subscription event: metadata first,
    /// then the customer reference on the existing record.
    async fn resolve_user(
        &self,
        metadata: &std::collections::HashMap<String, String>,
        customer_id: &str,
    ) -> BillingResult<Option<Uuid>> {
        if let Some(user_id) = metadata
            .get("user_id")
            .and_then(|raw| Uuid::parse_str(raw).ok())
        {
            return Ok(Some(user_id));
        }

        Ok(self
            .subscriptions()
            .record_for_customer(customer_id)
            .await?
            .map(|record| record.user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_accepts_new_and_rejects_seen() {
        let dedup = EventDedup::new();
        assert!(dedup.check_and_insert("evt_1"));
        assert!(!dedup.check_and_insert("evt_1"));
        assert!(dedup.check_and_insert("evt_2"));
    }

    #[test]
    fn dedup_evicts_oldest_at_capacity() {
        let dedup = EventDedup::with_capacity(2);
        assert!(dedup.check_and_insert("evt_1"));
        assert!(dedup.check_and_insert("evt_2"));
        assert!(dedup.check_and_insert("evt_3"));
        // evt_1 aged out, so it is treated as new again.
        assert!(dedup.check_and_insert("evt_1"));
        // evt_3 is still remembered.
        assert!(!dedup.check_and_insert("evt_3"));
    }

    #[test]
    fn signature_header_parses_timestamp_and_v1() {
        let header = parse_signature_header("t=1717243947,v1=abc123,v0=def456").unwrap();
        assert_eq!(header.timestamp, 1717243947);
        assert_eq!(header.v1, "abc123");
    }

    #[test]
    fn signature_header_rejects_missing_parts() {
        assert!(parse_signature_header("v1=abc123").is_err());
        assert!(parse_signature_header("t=1717243947").is_err());
        assert!(parse_signature_header("garbage").is_err());
    }
}

//! Common enums shared across crates.

use serde::{Deserialize, Serialize};

/// Local subscription status, mirroring the Stripe subscription lifecycle.
///
/// Stored as lowercase snaked strings in the `subscriptions.status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Incomplete,
    IncompleteExpired,
    Unpaid,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::Unpaid => "unpaid",
        }
    }

    /// Parse a status string from the database or from Stripe.
    /// Unknown strings map to `Incomplete` rather than failing, so a new
    /// Stripe status cannot wedge webhook processing.
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => SubscriptionStatus::Active,
            "trialing" => SubscriptionStatus::Trialing,
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" => SubscriptionStatus::Canceled,
            "incomplete_expired" => SubscriptionStatus::IncompleteExpired,
            "unpaid" => SubscriptionStatus::Unpaid,
            _ => SubscriptionStatus::Incomplete,
        }
    }

    /// Whether this status grants access to premium features.
    pub fn is_premium(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing
        )
    }

    /// Statuses that previously granted access. Used by the sync path to
    /// decide whether an orphaned local record must be forced to canceled.
    pub fn was_active_like(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active
                | SubscriptionStatus::Trialing
                | SubscriptionStatus::PastDue
        )
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a food product should be stored. Drives shelf-life inference when a
/// correction teaches us a new product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    Refrigerated,
    RoomTemperature,
    Frozen,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::Refrigerated => "refrigerated",
            StorageType::RoomTemperature => "room_temperature",
            StorageType::Frozen => "frozen",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "frozen" => StorageType::Frozen,
            "room_temperature" => StorageType::RoomTemperature,
            _ => StorageType::Refrigerated,
        }
    }
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrips_through_strings() {
        for status in [
            SubscriptionStatus::Active,
            SubscriptionStatus::Trialing,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Incomplete,
            SubscriptionStatus::IncompleteExpired,
            SubscriptionStatus::Unpaid,
        ] {
            assert_eq!(SubscriptionStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn unknown_status_maps_to_incomplete() {
        assert_eq!(
            SubscriptionStatus::parse("paused"),
            SubscriptionStatus::Incomplete
        );
    }

    #[test]
    fn premium_statuses() {
        assert!(SubscriptionStatus::Active.is_premium());
        assert!(SubscriptionStatus::Trialing.is_premium());
        assert!(!SubscriptionStatus::PastDue.is_premium());
        assert!(!SubscriptionStatus::Canceled.is_premium());
    }

    #[test]
    fn past_due_counts_as_previously_active() {
        assert!(SubscriptionStatus::PastDue.was_active_like());
        assert!(!SubscriptionStatus::Canceled.was_active_like());
    }
}

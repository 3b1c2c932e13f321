//! Shared types and database plumbing for Shelfwise.
//!
//! Everything here is used by at least two of the other crates: the
//! subscription status enum crosses the billing/api boundary, the storage
//! type enum crosses core/api, and pool construction is shared between the
//! server binary and integration tests.

pub mod db;
pub mod types;

pub use db::{create_pool, run_migrations};
pub use types::{StorageType, SubscriptionStatus};

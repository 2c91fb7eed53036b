//! In-memory registries of publisher instances and service subscriptions
//!
//! The registries are the only mutable shared state in the engine. Both
//! are concurrent maps with per-entry atomic mutation, safe against
//! interleaved access from foreground subscribe calls and background
//! sweeps.

mod publishers;
mod subscriptions;

pub use publishers::{PublisherRecord, PublisherRegistry, PublisherStatus};
pub use subscriptions::{ServiceSubscription, SubscriptionRegistry, SubscriptionStatus};

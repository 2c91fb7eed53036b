//! Service subscription registry

use std::collections::BTreeSet;
use std::fmt;
use std::time::SystemTime;

use dashmap::DashMap;

use crate::identity::TopicManifest;

/// Aggregate state of a consumer's interest in one service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriptionStatus {
    /// No interest declared for the service
    #[default]
    NotPresent,
    /// Interest declared; no publisher currently utilised
    PendingNoProviders,
    /// At least one publisher is utilised
    Active,
    /// Interest declared but permanently unserviceable
    Failed,
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotPresent => "not-present",
            Self::PendingNoProviders => "pending-no-providers",
            Self::Active => "active",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Durable record of a consumer's interest in one service.
///
/// Never deleted: interest outlives any individual publisher and persists
/// for the process lifetime.
#[derive(Debug, Clone)]
pub struct ServiceSubscription {
    /// The service the interest targets
    pub service_name: String,
    /// Union of every topic set ever requested for the service
    pub topics: BTreeSet<TopicManifest>,
    /// Aggregate status
    pub status: SubscriptionStatus,
    /// When interest was first declared
    pub registered_at: SystemTime,
    /// Detail on the latest status change
    pub commentary: String,
}

impl ServiceSubscription {
    fn new(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            topics: BTreeSet::new(),
            status: SubscriptionStatus::NotPresent,
            registered_at: SystemTime::now(),
            commentary: String::new(),
        }
    }
}

/// Registry of every service a local consumer has subscribed to, keyed by
/// service name
#[derive(Default)]
pub struct SubscriptionRegistry {
    records: DashMap<String, ServiceSubscription>,
}

impl SubscriptionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare interest in a service, merging topics into any existing
    /// record's set (union, never replace).
    ///
    /// A fresh record moves straight to `PendingNoProviders`; an existing
    /// record keeps its status.
    pub fn add_or_merge(
        &self,
        service_name: &str,
        topics: impl IntoIterator<Item = TopicManifest>,
    ) -> ServiceSubscription {
        let mut entry = self
            .records
            .entry(service_name.to_string())
            .or_insert_with(|| ServiceSubscription::new(service_name));
        let record = entry.value_mut();
        record.topics.extend(topics);
        if record.status == SubscriptionStatus::NotPresent {
            record.status = SubscriptionStatus::PendingNoProviders;
            record.commentary = "awaiting candidate publishers".to_string();
        }
        record.clone()
    }

    /// Look up a record by service name
    pub fn get(&self, service_name: &str) -> Option<ServiceSubscription> {
        self.records.get(service_name).map(|r| r.value().clone())
    }

    /// Every record in the registry
    pub fn all(&self) -> Vec<ServiceSubscription> {
        self.records.iter().map(|r| r.value().clone()).collect()
    }

    /// Mark a subscription active
    pub fn mark_active(&self, service_name: &str, commentary: &str) {
        self.set_status(service_name, SubscriptionStatus::Active, commentary);
    }

    /// Demote a subscription to pending
    pub fn mark_pending(&self, service_name: &str, commentary: &str) {
        self.set_status(service_name, SubscriptionStatus::PendingNoProviders, commentary);
    }

    fn set_status(&self, service_name: &str, status: SubscriptionStatus, commentary: &str) {
        if let Some(mut record) = self.records.get_mut(service_name) {
            record.status = status;
            record.commentary = commentary.to_string();
        }
    }
}

//! Publisher instance registry

use std::fmt;
use std::time::SystemTime;

use dashmap::DashMap;

use crate::identity::ParticipantIdentity;

/// Lifecycle state of one remote publisher instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublisherStatus {
    /// Not yet discovered; no record exists in this state
    #[default]
    NotRegistered,
    /// Discovered and recorded; no subscription attempt has concluded yet
    Registered,
    /// At least one subscription with this instance is in place
    Utilised,
    /// The instance rejected the subscription (scope policy or forwarder)
    NotUtilised,
    /// The last attempt failed at the transport level
    Failed,
}

impl fmt::Display for PublisherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotRegistered => "not-registered",
            Self::Registered => "registered",
            Self::Utilised => "utilised",
            Self::NotUtilised => "not-utilised",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Last known state of one remote publisher instance
#[derive(Debug, Clone)]
pub struct PublisherRecord {
    /// The instance's identity as currently known
    pub identity: ParticipantIdentity,
    /// Lifecycle state
    pub status: PublisherStatus,
    /// When the record last changed
    pub last_activity: SystemTime,
}

impl PublisherRecord {
    fn new(identity: ParticipantIdentity) -> Self {
        Self {
            identity,
            status: PublisherStatus::Registered,
            last_activity: SystemTime::now(),
        }
    }
}

/// Registry of every publisher instance ever observed, keyed by instance
/// name
#[derive(Default)]
pub struct PublisherRegistry {
    records: DashMap<String, PublisherRecord>,
}

impl PublisherRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a discovered instance.
    ///
    /// Idempotent: an existing record is returned untouched: no duplicate
    /// records, no status reset. A new record starts `Registered`.
    pub fn register(&self, identity: ParticipantIdentity) -> PublisherRecord {
        let entry = self
            .records
            .entry(identity.instance_name.clone())
            .or_insert_with(|| PublisherRecord::new(identity));
        entry.value().clone()
    }

    /// Look up a record by instance name
    pub fn get(&self, instance_name: &str) -> Option<PublisherRecord> {
        self.records.get(instance_name).map(|r| r.value().clone())
    }

    /// Update the lifecycle state of an instance
    pub fn set_status(&self, instance_name: &str, status: PublisherStatus) {
        if let Some(mut record) = self.records.get_mut(instance_name) {
            record.status = status;
            record.last_activity = SystemTime::now();
        }
    }

    /// Replace a record's identity with the instance's own self-description
    pub fn enrich(&self, instance_name: &str, identity: ParticipantIdentity) {
        if let Some(mut record) = self.records.get_mut(instance_name) {
            record.identity = identity;
            record.last_activity = SystemTime::now();
        }
    }

    /// Remove an instance, returning its final record so the caller can
    /// downgrade the aggregate subscription state
    pub fn unregister(&self, instance_name: &str) -> Option<PublisherRecord> {
        self.records.remove(instance_name).map(|(_, record)| record)
    }

    /// All records belonging to the given service
    pub fn records_for_service(&self, service_name: &str) -> Vec<PublisherRecord> {
        self.records
            .iter()
            .filter(|r| r.identity.service_name == service_name)
            .map(|r| r.value().clone())
            .collect()
    }

    /// Every record in the registry
    pub fn all(&self) -> Vec<PublisherRecord> {
        self.records.iter().map(|r| r.value().clone()).collect()
    }

    /// Whether any instance of the service is currently utilised
    pub fn has_utilised(&self, service_name: &str) -> bool {
        self.records.iter().any(|r| {
            r.identity.service_name == service_name && r.status == PublisherStatus::Utilised
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(instance: &str) -> ParticipantIdentity {
        ParticipantIdentity::from_membership(instance)
    }

    #[test]
    fn register_is_idempotent() {
        let registry = PublisherRegistry::new();

        let first = registry.register(identity("feed(a)"));
        assert_eq!(first.status, PublisherStatus::Registered);

        registry.set_status("feed(a)", PublisherStatus::Utilised);

        // A second register must not reset the status or duplicate the
        // record.
        let second = registry.register(identity("feed(a)"));
        assert_eq!(second.status, PublisherStatus::Utilised);
        assert_eq!(registry.all().len(), 1);
    }

    #[test]
    fn enrich_replaces_identity_wholesale() {
        let registry = PublisherRegistry::new();
        registry.register(identity("feed(a)"));

        let described = ParticipantIdentity::new("feed", "feed(a)", "zone-1", "site-1");
        registry.enrich("feed(a)", described.clone());

        assert_eq!(registry.get("feed(a)").unwrap().identity, described);
    }

    #[test]
    fn utilised_aggregation_is_per_service() {
        let registry = PublisherRegistry::new();
        registry.register(identity("feed(a)"));
        registry.register(identity("feed(b)"));
        registry.register(identity("other(a)"));

        assert!(!registry.has_utilised("feed"));

        registry.set_status("feed(b)", PublisherStatus::Utilised);
        assert!(registry.has_utilised("feed"));
        assert!(!registry.has_utilised("other"));
    }

    #[test]
    fn unregister_returns_final_record() {
        let registry = PublisherRegistry::new();
        registry.register(identity("feed(a)"));
        registry.set_status("feed(a)", PublisherStatus::Failed);

        let removed = registry.unregister("feed(a)").unwrap();
        assert_eq!(removed.status, PublisherStatus::Failed);
        assert!(registry.get("feed(a)").is_none());
        assert!(registry.unregister("feed(a)").is_none());
    }
}

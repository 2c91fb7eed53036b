//! Participant identity and topic types
//!
//! Instance names follow the `serviceName(uniqueSuffix)` convention: the
//! service name groups every instance able to serve the same topics, the
//! suffix makes one running process unique within the service.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Extract the service name from an instance name.
///
/// `vitals-feed(abc)` resolves to `vitals-feed`; a name without a suffix
/// is its own service name.
pub fn service_of_instance(instance_name: &str) -> &str {
    match instance_name.find('(') {
        Some(index) => &instance_name[..index],
        None => instance_name,
    }
}

/// Identity of one remote (or local) participant in the federation.
///
/// Immutable once created; the registry replaces a whole record's identity
/// when a participant's own self-description arrives, it never mutates one
/// in place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantIdentity {
    /// Logical name shared by all instances serving the same topics
    pub service_name: String,
    /// Unique name of this running instance
    pub instance_name: String,
    /// Administrative zone the instance runs in
    pub zone: String,
    /// Network site the instance runs at
    pub site: String,
}

impl ParticipantIdentity {
    /// Create a fully-described identity
    pub fn new(
        service_name: impl Into<String>,
        instance_name: impl Into<String>,
        zone: impl Into<String>,
        site: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            instance_name: instance_name.into(),
            zone: zone.into(),
            site: site.into(),
        }
    }

    /// Identity as known from a membership scan alone.
    ///
    /// Zone and site are unknown until the participant describes itself in
    /// a protocol response; until then they are empty.
    pub fn from_membership(instance_name: &str) -> Self {
        Self {
            service_name: service_of_instance(instance_name).to_string(),
            instance_name: instance_name.to_string(),
            zone: String::new(),
            site: String::new(),
        }
    }
}

impl fmt::Display for ParticipantIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.instance_name, self.site, self.zone)
    }
}

/// Opaque descriptor of a category of data a consumer wants.
///
/// The engine never interprets the contents; it only compares manifests
/// for equality and aggregates sets of them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicManifest(String);

impl TopicManifest {
    /// Create a manifest from its descriptor token
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self(descriptor.into())
    }

    /// The descriptor token
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TopicManifest {
    fn from(descriptor: &str) -> Self {
        Self::new(descriptor)
    }
}

/// Topology relationship between a subscriber and a publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeRelation {
    /// Same site, same zone
    IntraZone,
    /// Same site, different zone
    InterZone,
    /// Different site
    InterSite,
}

impl ScopeRelation {
    /// Classify the relationship between two participants
    pub fn classify(local: &ParticipantIdentity, remote: &ParticipantIdentity) -> Self {
        if local.site != remote.site {
            Self::InterSite
        } else if local.zone != remote.zone {
            Self::InterZone
        } else {
            Self::IntraZone
        }
    }
}

impl fmt::Display for ScopeRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IntraZone => "intra-zone",
            Self::InterZone => "inter-zone",
            Self::InterSite => "inter-site",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_name_extracted_from_instance_name() {
        assert_eq!(service_of_instance("vitals-feed(abc)"), "vitals-feed");
        assert_eq!(service_of_instance("vitals-feed"), "vitals-feed");
        assert_eq!(service_of_instance("a(b)(c)"), "a");
    }

    #[test]
    fn membership_identity_has_unknown_scope() {
        let identity = ParticipantIdentity::from_membership("labs-feed(7f)");
        assert_eq!(identity.service_name, "labs-feed");
        assert_eq!(identity.instance_name, "labs-feed(7f)");
        assert!(identity.zone.is_empty());
        assert!(identity.site.is_empty());
    }

    #[test]
    fn scope_relation_classification() {
        let local = ParticipantIdentity::new("a", "a(1)", "zone-a", "site-a");

        let same = ParticipantIdentity::new("b", "b(1)", "zone-a", "site-a");
        assert_eq!(ScopeRelation::classify(&local, &same), ScopeRelation::IntraZone);

        let other_zone = ParticipantIdentity::new("b", "b(1)", "zone-b", "site-a");
        assert_eq!(
            ScopeRelation::classify(&local, &other_zone),
            ScopeRelation::InterZone
        );

        // Site difference dominates zone difference.
        let other_site = ParticipantIdentity::new("b", "b(1)", "zone-a", "site-b");
        assert_eq!(
            ScopeRelation::classify(&local, &other_site),
            ScopeRelation::InterSite
        );
    }
}

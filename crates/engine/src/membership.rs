//! Membership resolution over the live transport view
//!
//! No caching: every call re-reads the transport's current view so results
//! always reflect the most recent membership change. An unavailable
//! transport reads as an empty view; higher layers treat "no candidates"
//! and "all candidates failed" identically.

use std::sync::Arc;

use meshpub_transport::{Address, Member, Transport};

use crate::identity::service_of_instance;

/// Resolves logical service names to candidate members
pub struct MembershipResolver<T>
where
    T: Transport,
{
    transport: Arc<T>,
}

impl<T> MembershipResolver<T>
where
    T: Transport,
{
    /// Create a resolver over the given transport
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// All currently-visible instances of the given service
    pub async fn candidates_for_service(&self, service_name: &str) -> Vec<Member> {
        self.transport
            .membership_view()
            .await
            .into_iter()
            .filter(|member| service_of_instance(&member.instance_name) == service_name)
            .collect()
    }

    /// Whether the given instance is present in the current view
    pub async fn is_instance_reachable(&self, instance_name: &str) -> bool {
        self.transport
            .membership_view()
            .await
            .iter()
            .any(|member| member.instance_name == instance_name)
    }

    /// The current address of the given instance, if present
    pub async fn address_of(&self, instance_name: &str) -> Option<Address> {
        self.transport
            .membership_view()
            .await
            .into_iter()
            .find(|member| member.instance_name == instance_name)
            .map(|member| member.address)
    }
}

impl<T> Clone for MembershipResolver<T>
where
    T: Transport,
{
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

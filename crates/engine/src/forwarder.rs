//! Local forwarder collaborator
//!
//! The engine negotiates subscriptions; actually wiring an accepted
//! subscription into the local data-flow machinery is delegated to this
//! trait.

use async_trait::async_trait;

use crate::identity::{ParticipantIdentity, TopicManifest};

/// Decision returned by the local forwarder
#[derive(Debug, Clone)]
pub struct ForwardDecision {
    /// Whether the subscription was wired in locally
    pub accepted: bool,
    /// Detail surfaced verbatim in the response commentary
    pub commentary: String,
}

impl ForwardDecision {
    /// An accepting decision
    pub fn accept(commentary: impl Into<String>) -> Self {
        Self {
            accepted: true,
            commentary: commentary.into(),
        }
    }

    /// A rejecting decision
    pub fn reject(commentary: impl Into<String>) -> Self {
        Self {
            accepted: false,
            commentary: commentary.into(),
        }
    }
}

/// Wires accepted subscriptions into the local data-flow engine
#[async_trait]
pub trait LocalForwarder: Send + Sync + 'static {
    /// Establish local forwarding of the given topics to the subscriber
    async fn local_subscribe(
        &self,
        topics: &[TopicManifest],
        subscriber: &ParticipantIdentity,
    ) -> ForwardDecision;
}

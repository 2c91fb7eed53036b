//! Subscription protocol payloads
//!
//! Transient RPC messages only; registry records are the durable state.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::identity::{ParticipantIdentity, TopicManifest};

/// RPC method subscription requests travel under
pub const SUBSCRIBE_METHOD: &str = "meshpub.subscribe";

/// Outcome classification carried in a subscription response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionOutcome {
    /// The publisher accepted the subscription
    Registered,
    /// The publisher rejected the subscription (scope policy or forwarder)
    RegistrationFailed,
    /// The target was not present in membership; no call was attempted
    PublisherNotReachable,
    /// The call timed out or the transport failed
    NetworkFailure,
}

/// Request a subscriber sends to a candidate publisher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    /// The subscriber's full self-description
    pub subscriber: ParticipantIdentity,
    /// Topics the subscriber wants delivered
    pub topics: Vec<TopicManifest>,
}

/// Response a publisher returns (or the caller synthesizes on failure)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    /// The responder's self-description (authoritative about itself).
    ///
    /// Synthesized failure responses carry the target identity as locally
    /// known instead.
    pub publisher: ParticipantIdentity,
    /// Whether the subscription is now in place
    pub success: bool,
    /// Outcome classification
    pub outcome: SubscriptionOutcome,
    /// Human-readable detail on the outcome
    pub commentary: String,
    /// When the response was produced
    pub timestamp: SystemTime,
}

impl SubscriptionResponse {
    /// A delivered acceptance from the local participant
    pub fn accepted(publisher: ParticipantIdentity, commentary: impl Into<String>) -> Self {
        Self {
            publisher,
            success: true,
            outcome: SubscriptionOutcome::Registered,
            commentary: commentary.into(),
            timestamp: SystemTime::now(),
        }
    }

    /// A delivered rejection from the local participant
    pub fn rejected(publisher: ParticipantIdentity, commentary: impl Into<String>) -> Self {
        Self {
            publisher,
            success: false,
            outcome: SubscriptionOutcome::RegistrationFailed,
            commentary: commentary.into(),
            timestamp: SystemTime::now(),
        }
    }

    /// Synthesized locally: the target is absent from membership
    pub fn unreachable(target: ParticipantIdentity) -> Self {
        let commentary = format!("{} is not reachable in the current membership", target.instance_name);
        Self {
            publisher: target,
            success: false,
            outcome: SubscriptionOutcome::PublisherNotReachable,
            commentary,
            timestamp: SystemTime::now(),
        }
    }

    /// Synthesized locally: the call itself failed
    pub fn network_failure(target: ParticipantIdentity, detail: &str) -> Self {
        let commentary = format!("request to {} failed: {}", target.instance_name, detail);
        Self {
            publisher: target,
            success: false,
            outcome: SubscriptionOutcome::NetworkFailure,
            commentary,
            timestamp: SystemTime::now(),
        }
    }

    /// Whether this response was delivered by the remote side (as opposed
    /// to synthesized locally). Only delivered responses carry an
    /// authoritative publisher self-description.
    pub fn is_delivered(&self) -> bool {
        matches!(
            self.outcome,
            SubscriptionOutcome::Registered | SubscriptionOutcome::RegistrationFailed
        )
    }
}

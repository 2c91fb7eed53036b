//! Inbound side of the subscription protocol
//!
//! Applies the zone/site authorization policy and delegates accepted
//! requests to the local forwarder. Every response carries the local
//! identity so the caller can cache an authoritative self-description.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::ScopeCapabilities;
use crate::forwarder::LocalForwarder;
use crate::identity::{ParticipantIdentity, ScopeRelation};
use crate::protocol::{SubscriptionRequest, SubscriptionResponse};
use crate::registry::PublisherRegistry;

/// Answers inbound subscription requests
pub struct InboundHandler<F>
where
    F: LocalForwarder,
{
    local: ParticipantIdentity,
    capabilities: ScopeCapabilities,
    forwarder: Arc<F>,
    participants: Arc<PublisherRegistry>,
}

impl<F> InboundHandler<F>
where
    F: LocalForwarder,
{
    /// Create a handler answering as the given local participant
    pub fn new(
        local: ParticipantIdentity,
        capabilities: ScopeCapabilities,
        forwarder: Arc<F>,
        participants: Arc<PublisherRegistry>,
    ) -> Self {
        Self {
            local,
            capabilities,
            forwarder,
            participants,
        }
    }

    /// Answer one subscription request
    pub async fn handle(&self, request: SubscriptionRequest) -> SubscriptionResponse {
        // The caller becomes a known participant either way.
        self.participants.register(request.subscriber.clone());

        let relation = ScopeRelation::classify(&self.local, &request.subscriber);
        debug!(
            "subscription request from {} ({} topics, {})",
            request.subscriber,
            request.topics.len(),
            relation
        );

        if !self.capabilities.allows(relation) {
            info!(
                "rejecting {} subscription from {}: relationship not supported",
                relation, request.subscriber
            );
            return SubscriptionResponse::rejected(
                self.local.clone(),
                "not supported for this relationship",
            );
        }

        let decision = self
            .forwarder
            .local_subscribe(&request.topics, &request.subscriber)
            .await;

        if decision.accepted {
            info!(
                "accepted subscription from {} for {} topics",
                request.subscriber,
                request.topics.len()
            );
            SubscriptionResponse::accepted(self.local.clone(), decision.commentary)
        } else {
            info!(
                "forwarder rejected subscription from {}: {}",
                request.subscriber, decision.commentary
            );
            SubscriptionResponse::rejected(self.local.clone(), decision.commentary)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarder::ForwardDecision;
    use crate::identity::TopicManifest;
    use crate::protocol::SubscriptionOutcome;
    use async_trait::async_trait;

    struct StubForwarder {
        decision: ForwardDecision,
    }

    #[async_trait]
    impl LocalForwarder for StubForwarder {
        async fn local_subscribe(
            &self,
            _topics: &[TopicManifest],
            _subscriber: &ParticipantIdentity,
        ) -> ForwardDecision {
            self.decision.clone()
        }
    }

    fn handler(capabilities: ScopeCapabilities, decision: ForwardDecision) -> InboundHandler<StubForwarder> {
        InboundHandler::new(
            ParticipantIdentity::new("vitals-feed", "vitals-feed(abc)", "zone-a", "site-a"),
            capabilities,
            Arc::new(StubForwarder { decision }),
            Arc::new(PublisherRegistry::new()),
        )
    }

    fn request_from(zone: &str, site: &str) -> SubscriptionRequest {
        SubscriptionRequest {
            subscriber: ParticipantIdentity::new("consumer", "consumer(1)", zone, site),
            topics: vec![TopicManifest::new("VITALS")],
        }
    }

    #[tokio::test]
    async fn inter_site_rejected_when_unsupported() {
        let handler = handler(
            ScopeCapabilities {
                supports_intra_zone: true,
                supports_inter_zone: true,
                supports_inter_site: false,
            },
            ForwardDecision::accept("wired"),
        );

        let response = handler.handle(request_from("zone-a", "site-b")).await;
        assert!(!response.success);
        assert_eq!(response.outcome, SubscriptionOutcome::RegistrationFailed);
        assert_eq!(response.commentary, "not supported for this relationship");
        assert_eq!(response.publisher.instance_name, "vitals-feed(abc)");
    }

    #[tokio::test]
    async fn intra_zone_accepted_and_forwarded() {
        let handler = handler(ScopeCapabilities::default(), ForwardDecision::accept("wired"));

        let response = handler.handle(request_from("zone-a", "site-a")).await;
        assert!(response.success);
        assert_eq!(response.outcome, SubscriptionOutcome::Registered);
        assert_eq!(response.commentary, "wired");
    }

    #[tokio::test]
    async fn forwarder_rejection_surfaces_verbatim() {
        let handler = handler(
            ScopeCapabilities::default(),
            ForwardDecision::reject("no route for topic set"),
        );

        let response = handler.handle(request_from("zone-a", "site-a")).await;
        assert!(!response.success);
        assert_eq!(response.outcome, SubscriptionOutcome::RegistrationFailed);
        assert_eq!(response.commentary, "no route for topic set");
    }

    #[tokio::test]
    async fn caller_is_registered_as_participant() {
        let participants = Arc::new(PublisherRegistry::new());
        let handler = InboundHandler::new(
            ParticipantIdentity::new("vitals-feed", "vitals-feed(abc)", "zone-a", "site-a"),
            ScopeCapabilities::default(),
            Arc::new(StubForwarder {
                decision: ForwardDecision::accept("wired"),
            }),
            participants.clone(),
        );

        handler.handle(request_from("zone-a", "site-a")).await;
        assert!(participants.get("consumer(1)").is_some());
    }
}

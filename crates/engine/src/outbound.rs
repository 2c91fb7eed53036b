//! Outbound side of the subscription protocol
//!
//! Failure handling is strictly local: an absent target or a failed call
//! becomes a synthesized negative response, never a propagated error. The
//! retry sweeper decides what to do with it.

use std::sync::Arc;
use std::time::Duration;

use meshpub_network::RpcManager;
use meshpub_transport::Transport;
use tracing::{debug, warn};

use crate::identity::{ParticipantIdentity, TopicManifest};
use crate::membership::MembershipResolver;
use crate::protocol::{SUBSCRIBE_METHOD, SubscriptionRequest, SubscriptionResponse};

/// Issues subscription requests to candidate publishers
pub struct SubscriptionClient<T>
where
    T: Transport,
{
    rpc: Arc<RpcManager<T>>,
    resolver: MembershipResolver<T>,
    local: ParticipantIdentity,
    request_timeout: Duration,
}

impl<T> SubscriptionClient<T>
where
    T: Transport,
{
    /// Create a client subscribing as the given local participant
    pub fn new(
        rpc: Arc<RpcManager<T>>,
        resolver: MembershipResolver<T>,
        local: ParticipantIdentity,
        request_timeout: Duration,
    ) -> Self {
        Self {
            rpc,
            resolver,
            local,
            request_timeout,
        }
    }

    /// Request a subscription for the given topics from one target
    /// instance.
    ///
    /// Always returns a response: delivered when the call succeeds,
    /// synthesized (`PublisherNotReachable` / `NetworkFailure`) when it
    /// cannot.
    pub async fn request_subscription(
        &self,
        topics: &[TopicManifest],
        target: &ParticipantIdentity,
    ) -> SubscriptionResponse {
        let Some(address) = self.resolver.address_of(&target.instance_name).await else {
            debug!(
                "target {} absent from membership, synthesizing failure",
                target.instance_name
            );
            return SubscriptionResponse::unreachable(target.clone());
        };

        let request = SubscriptionRequest {
            subscriber: self.local.clone(),
            topics: topics.to_vec(),
        };

        debug!(
            "requesting subscription of {} topics from {} at {}",
            topics.len(),
            target.instance_name,
            address
        );

        match self
            .rpc
            .request::<SubscriptionRequest, SubscriptionResponse>(
                &address,
                SUBSCRIBE_METHOD,
                &request,
                self.request_timeout,
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    "subscription request to {} failed: {}",
                    target.instance_name, e
                );
                SubscriptionResponse::network_failure(target.clone(), &e.to_string())
            }
        }
    }
}

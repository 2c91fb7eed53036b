//! Retry sweeper: liveness and completion passes
//!
//! One long-lived background task re-evaluates all pending subscriptions
//! against current membership. It fires on a fixed period while anything
//! is pending, absorbs a bounded number of no-op confirmations after
//! convergence, then parks until the membership reactor or a new
//! subscribe call wakes it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use meshpub_transport::Transport;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::FederationConfig;
use crate::identity::{ParticipantIdentity, TopicManifest};
use crate::membership::MembershipResolver;
use crate::outbound::SubscriptionClient;
use crate::protocol::{SubscriptionOutcome, SubscriptionResponse};
use crate::registry::{
    PublisherRegistry, PublisherStatus, SubscriptionRegistry, SubscriptionStatus,
};

/// Which publisher states an attempt round contacts
#[derive(Debug, Clone, Copy)]
pub(crate) enum AttemptScope {
    /// A foreground subscribe call: contact every known instance of the
    /// service, including currently utilised ones (the topic set may have
    /// grown).
    ExplicitSubscribe,
    /// A background sweep. Policy-rejected instances are only re-contacted
    /// when membership changed since the last pass.
    Sweep {
        /// Whether membership changed since the last pass
        membership_dirty: bool,
    },
}

impl AttemptScope {
    fn contacts(self, status: PublisherStatus) -> bool {
        match (self, status) {
            (_, PublisherStatus::Registered | PublisherStatus::Failed) => true,
            (Self::ExplicitSubscribe, _) => true,
            (Self::Sweep { membership_dirty }, PublisherStatus::NotUtilised) => membership_dirty,
            (Self::Sweep { .. }, _) => false,
        }
    }
}

/// Drives subscriptions toward convergence with current membership
pub struct Sweeper<T>
where
    T: Transport,
{
    resolver: MembershipResolver<T>,
    publishers: Arc<PublisherRegistry>,
    subscriptions: Arc<SubscriptionRegistry>,
    client: SubscriptionClient<T>,
    wake: Arc<Notify>,
    membership_dirty: Arc<AtomicBool>,
    config: FederationConfig,
}

impl<T> Sweeper<T>
where
    T: Transport,
{
    pub(crate) fn new(
        resolver: MembershipResolver<T>,
        publishers: Arc<PublisherRegistry>,
        subscriptions: Arc<SubscriptionRegistry>,
        client: SubscriptionClient<T>,
        wake: Arc<Notify>,
        membership_dirty: Arc<AtomicBool>,
        config: FederationConfig,
    ) -> Self {
        Self {
            resolver,
            publishers,
            subscriptions,
            client,
            wake,
            membership_dirty,
            config,
        }
    }

    /// Wake the sweep loop for an immediate out-of-cycle pass
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// The wake signal shared with the membership reactor
    pub(crate) fn wake_handle(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    /// The membership-dirty flag shared with the membership reactor
    pub(crate) fn dirty_handle(&self) -> Arc<AtomicBool> {
        self.membership_dirty.clone()
    }

    /// Run the sweep loop until cancelled
    pub(crate) async fn run(self: Arc<Self>, cancellation: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut idle_passes = 0usize;

        loop {
            if idle_passes >= self.config.max_idle_passes {
                // Converged: stop ticking until something changes.
                debug!("sweeper parked after {} idle passes", idle_passes);
                tokio::select! {
                    () = cancellation.cancelled() => break,
                    () = self.wake.notified() => {
                        idle_passes = 0;
                        interval.reset();
                    }
                }
            } else {
                tokio::select! {
                    () = cancellation.cancelled() => break,
                    () = self.wake.notified() => {}
                    _ = interval.tick() => {}
                }
            }

            let membership_dirty = self.membership_dirty.swap(false, Ordering::SeqCst);
            self.liveness_pass().await;
            let still_pending = self.completion_pass(membership_dirty).await;

            if still_pending {
                idle_passes = 0;
            } else {
                idle_passes += 1;
            }
        }

        debug!("sweeper exiting");
    }

    /// Liveness pass: drop every registered instance that left membership
    /// and downgrade the affected subscriptions.
    pub(crate) async fn liveness_pass(&self) {
        for record in self.publishers.all() {
            let instance = &record.identity.instance_name;
            if self.resolver.is_instance_reachable(instance).await {
                continue;
            }

            info!("publisher {} no longer in membership, unregistering", instance);
            if let Some(removed) = self.publishers.unregister(instance) {
                let service = &removed.identity.service_name;
                if self.subscriptions.get(service).is_some()
                    && !self.publishers.has_utilised(service)
                {
                    self.subscriptions
                        .mark_pending(service, "publisher left membership");
                }
            }
        }
    }

    /// Completion pass over every pending subscription. Returns whether
    /// anything is still pending afterwards.
    pub(crate) async fn completion_pass(&self, membership_dirty: bool) -> bool {
        let pending: Vec<String> = self
            .subscriptions
            .all()
            .into_iter()
            .filter(|s| s.status == SubscriptionStatus::PendingNoProviders)
            .map(|s| s.service_name)
            .collect();

        for service in &pending {
            self.attempt_service(service, AttemptScope::Sweep { membership_dirty })
                .await;
        }

        self.subscriptions
            .all()
            .iter()
            .any(|s| s.status == SubscriptionStatus::PendingNoProviders)
    }

    /// Try to complete one service's subscription: discover candidates,
    /// contact the ones in scope, apply the resulting transitions.
    pub(crate) async fn attempt_service(&self, service_name: &str, scope: AttemptScope) {
        let Some(subscription) = self.subscriptions.get(service_name) else {
            return;
        };
        let topics: Vec<TopicManifest> = subscription.topics.iter().cloned().collect();

        // Newly visible candidates enter the registry as Registered.
        for member in self.resolver.candidates_for_service(service_name).await {
            self.publishers
                .register(ParticipantIdentity::from_membership(&member.instance_name));
        }

        let mut last_commentary: Option<String> = None;
        for publisher in self.publishers.records_for_service(service_name) {
            if !scope.contacts(publisher.status) {
                continue;
            }

            let response = self
                .client
                .request_subscription(&topics, &publisher.identity)
                .await;
            self.apply_response(&publisher.identity.instance_name, &response);
            last_commentary = Some(response.commentary);
        }

        if self.publishers.has_utilised(service_name) {
            self.subscriptions
                .mark_active(service_name, "publisher utilised");
        } else if let Some(commentary) = last_commentary {
            self.subscriptions.mark_pending(service_name, &commentary);
        } else if subscription.status != SubscriptionStatus::PendingNoProviders {
            // Nothing was contacted but the record cannot stay active
            // without a utilised publisher.
            self.subscriptions
                .mark_pending(service_name, "no candidate publishers in current membership");
        }
    }

    fn apply_response(&self, instance_name: &str, response: &SubscriptionResponse) {
        if response.is_delivered() {
            // The responder is authoritative about itself.
            self.publishers
                .enrich(instance_name, response.publisher.clone());
        }

        let status = if response.success {
            PublisherStatus::Utilised
        } else {
            match response.outcome {
                SubscriptionOutcome::RegistrationFailed | SubscriptionOutcome::Registered => {
                    PublisherStatus::NotUtilised
                }
                SubscriptionOutcome::PublisherNotReachable
                | SubscriptionOutcome::NetworkFailure => PublisherStatus::Failed,
            }
        };
        self.publishers.set_status(instance_name, status);
    }
}

//! Federation manager: the public face of the engine

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use meshpub_network::RpcManager;
use meshpub_transport::Transport;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::FederationConfig;
use crate::error::EngineResult;
use crate::forwarder::LocalForwarder;
use crate::handler::InboundHandler;
use crate::identity::{ParticipantIdentity, TopicManifest};
use crate::membership::MembershipResolver;
use crate::outbound::SubscriptionClient;
use crate::protocol::{SUBSCRIBE_METHOD, SubscriptionRequest, SubscriptionResponse};
use crate::reactor::MembershipReactor;
use crate::registry::{PublisherRecord, PublisherRegistry, ServiceSubscription, SubscriptionRegistry};
use crate::sweeper::{AttemptScope, Sweeper};

/// Broker-less publish/subscribe federation for one participant.
///
/// Owns the registries, the protocol handlers and the background
/// sweeper/reactor tasks; collaborators (transport, forwarder) are
/// injected at construction.
pub struct FederationManager<T, F>
where
    T: Transport,
    F: LocalForwarder,
{
    local: ParticipantIdentity,
    transport: Arc<T>,
    rpc: Arc<RpcManager<T>>,
    publishers: Arc<PublisherRegistry>,
    subscriptions: Arc<SubscriptionRegistry>,
    sweeper: Arc<Sweeper<T>>,
    inbound: Arc<InboundHandler<F>>,
    task_tracker: TaskTracker,
    cancellation: CancellationToken,
}

impl<T, F> FederationManager<T, F>
where
    T: Transport,
    F: LocalForwarder,
{
    /// Create a manager participating as `local` over the given transport
    pub fn new(
        local: ParticipantIdentity,
        transport: Arc<T>,
        forwarder: Arc<F>,
        config: FederationConfig,
    ) -> Self {
        let rpc = Arc::new(RpcManager::new(transport.clone()));
        let publishers = Arc::new(PublisherRegistry::new());
        let subscriptions = Arc::new(SubscriptionRegistry::new());
        let resolver = MembershipResolver::new(transport.clone());

        let client = SubscriptionClient::new(
            rpc.clone(),
            resolver.clone(),
            local.clone(),
            config.request_timeout,
        );

        let wake = Arc::new(Notify::new());
        // Dirty from the start: the first pass must consider everything.
        let membership_dirty = Arc::new(AtomicBool::new(true));

        let sweeper = Arc::new(Sweeper::new(
            resolver,
            publishers.clone(),
            subscriptions.clone(),
            client,
            wake,
            membership_dirty,
            config.clone(),
        ));

        let inbound = Arc::new(InboundHandler::new(
            local.clone(),
            config.capabilities.clone(),
            forwarder,
            publishers.clone(),
        ));

        Self {
            local,
            transport,
            rpc,
            publishers,
            subscriptions,
            sweeper,
            inbound,
            task_tracker: TaskTracker::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// The local participant's identity
    pub fn local_identity(&self) -> &ParticipantIdentity {
        &self.local
    }

    /// Start the RPC layer and the background sweeper and reactor tasks
    pub async fn start(&self) -> EngineResult<()> {
        info!("starting federation manager for {}", self.local);

        let inbound = self.inbound.clone();
        self.rpc.register_request_handler(
            SUBSCRIBE_METHOD,
            move |_sender, request: SubscriptionRequest| {
                let inbound = inbound.clone();
                async move { Ok(inbound.handle(request).await) }
            },
        );
        self.rpc.start();

        {
            let sweeper = self.sweeper.clone();
            let cancellation = self.cancellation.clone();
            self.task_tracker.spawn(async move {
                sweeper.run(cancellation).await;
            });
        }

        {
            let reactor = MembershipReactor::new(
                self.sweeper_wake_handle(),
                self.sweeper_dirty_handle(),
            );
            let transport = self.transport.clone();
            let cancellation = self.cancellation.clone();
            self.task_tracker.spawn(async move {
                reactor.run(transport, cancellation).await;
            });
        }

        Ok(())
    }

    /// Declare interest in a topic set from a service.
    ///
    /// Attempts every currently-visible candidate synchronously and
    /// returns the best-known state; a `PendingNoProviders` result
    /// converges later as the sweeper and reactor keep retrying.
    pub async fn subscribe(
        &self,
        service_name: &str,
        topics: impl IntoIterator<Item = TopicManifest>,
    ) -> ServiceSubscription {
        let record = self.subscriptions.add_or_merge(service_name, topics);
        debug!(
            "subscription interest for {} now spans {} topics",
            service_name,
            record.topics.len()
        );

        self.sweeper
            .attempt_service(service_name, AttemptScope::ExplicitSubscribe)
            .await;

        let snapshot = self.subscriptions.get(service_name).unwrap_or(record);
        // Keep the sweeper unparked so a pending result is retried.
        self.sweeper.wake();
        snapshot
    }

    /// Answer one inbound subscription request.
    ///
    /// This is the same entry point remote participants reach over RPC;
    /// exposed for direct invocation and tests.
    pub async fn handle_subscription_request(
        &self,
        request: SubscriptionRequest,
    ) -> SubscriptionResponse {
        self.inbound.handle(request).await
    }

    /// Current aggregate state of a service subscription
    pub fn subscription_status(&self, service_name: &str) -> Option<ServiceSubscription> {
        self.subscriptions.get(service_name)
    }

    /// Every service subscription ever declared
    pub fn subscriptions(&self) -> Vec<ServiceSubscription> {
        self.subscriptions.all()
    }

    /// Last known state of a publisher instance
    pub fn publisher_status(&self, instance_name: &str) -> Option<PublisherRecord> {
        self.publishers.get(instance_name)
    }

    /// Shutdown the background tasks, the RPC layer and the transport
    pub async fn shutdown(&self) -> EngineResult<()> {
        info!("shutting down federation manager for {}", self.local);

        self.cancellation.cancel();
        self.task_tracker.close();

        match tokio::time::timeout(Duration::from_secs(5), self.task_tracker.wait()).await {
            Ok(()) => debug!("federation tasks shut down cleanly"),
            Err(_) => warn!("federation tasks did not shut down within timeout"),
        }

        self.rpc.shutdown().await;
        self.transport.shutdown().await?;
        Ok(())
    }

    fn sweeper_wake_handle(&self) -> Arc<Notify> {
        self.sweeper.wake_handle()
    }

    fn sweeper_dirty_handle(&self) -> Arc<AtomicBool> {
        self.sweeper.dirty_handle()
    }
}

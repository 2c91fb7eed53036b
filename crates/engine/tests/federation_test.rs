//! End-to-end federation tests over the in-memory mesh
//!
//! Each test stands up one or more federation managers on a shared
//! `MemoryMesh` and scripts membership changes to drive convergence.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use meshpub_engine::{
    FederationConfig, FederationManager, ForwardDecision, LocalForwarder, ParticipantIdentity,
    PublisherStatus, ScopeCapabilities, SubscriptionStatus, TopicManifest,
};
use meshpub_transport_memory::{MemoryMesh, MemoryTransport};
use tokio::time::{sleep, timeout};

/// Forwarder recording every delegated subscription
struct RecordingForwarder {
    accept: bool,
    calls: Mutex<Vec<(Vec<TopicManifest>, ParticipantIdentity)>>,
}

impl RecordingForwarder {
    fn accepting() -> Arc<Self> {
        Arc::new(Self {
            accept: true,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            accept: false,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LocalForwarder for RecordingForwarder {
    async fn local_subscribe(
        &self,
        topics: &[TopicManifest],
        subscriber: &ParticipantIdentity,
    ) -> ForwardDecision {
        self.calls
            .lock()
            .unwrap()
            .push((topics.to_vec(), subscriber.clone()));
        if self.accept {
            ForwardDecision::accept("forwarding established")
        } else {
            ForwardDecision::reject("no route for topic set")
        }
    }
}

fn test_config(capabilities: ScopeCapabilities) -> FederationConfig {
    FederationConfig {
        request_timeout: Duration::from_secs(1),
        sweep_interval: Duration::from_millis(200),
        max_idle_passes: 10,
        capabilities,
    }
}

async fn start_node(
    mesh: &Arc<MemoryMesh>,
    identity: ParticipantIdentity,
    capabilities: ScopeCapabilities,
    forwarder: Arc<RecordingForwarder>,
) -> Arc<FederationManager<MemoryTransport, RecordingForwarder>> {
    let transport = Arc::new(mesh.join(&identity.instance_name));
    let manager = Arc::new(FederationManager::new(
        identity,
        transport,
        forwarder,
        test_config(capabilities),
    ));
    manager.start().await.expect("start failed");
    manager
}

fn consumer_identity() -> ParticipantIdentity {
    ParticipantIdentity::new("consumer", "consumer(1)", "zone-a", "site-a")
}

fn vitals_identity() -> ParticipantIdentity {
    ParticipantIdentity::new("vitals-feed", "vitals-feed(abc)", "zone-a", "site-a")
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting until {what}"));
}

#[tokio::test]
async fn subscribe_without_candidates_stays_pending() {
    let _ = tracing_subscriber::fmt().try_init();

    let mesh = MemoryMesh::new();
    let consumer = start_node(
        &mesh,
        consumer_identity(),
        ScopeCapabilities::default(),
        RecordingForwarder::accepting(),
    )
    .await;

    let record = consumer
        .subscribe("vitals-feed", [TopicManifest::new("VITALS")])
        .await;
    assert_eq!(record.status, SubscriptionStatus::PendingNoProviders);

    // Give the sweeper a few cycles: with no candidates the record must
    // never become active.
    sleep(Duration::from_millis(600)).await;
    let record = consumer.subscription_status("vitals-feed").unwrap();
    assert_eq!(record.status, SubscriptionStatus::PendingNoProviders);
    assert!(consumer.publisher_status("vitals-feed(abc)").is_none());

    consumer.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
async fn subscription_converges_when_candidate_joins() {
    let _ = tracing_subscriber::fmt().try_init();

    let mesh = MemoryMesh::new();
    let consumer = start_node(
        &mesh,
        consumer_identity(),
        ScopeCapabilities::default(),
        RecordingForwarder::accepting(),
    )
    .await;

    let record = consumer
        .subscribe("vitals-feed", [TopicManifest::new("VITALS")])
        .await;
    assert_eq!(record.status, SubscriptionStatus::PendingNoProviders);

    // The publisher appears; the membership reactor should converge the
    // subscription without waiting for a periodic sweep.
    let forwarder = RecordingForwarder::accepting();
    let publisher = start_node(
        &mesh,
        vitals_identity(),
        ScopeCapabilities::default(),
        forwarder.clone(),
    )
    .await;

    wait_until("subscription is active", || {
        consumer
            .subscription_status("vitals-feed")
            .is_some_and(|s| s.status == SubscriptionStatus::Active)
    })
    .await;

    let publisher_record = consumer.publisher_status("vitals-feed(abc)").unwrap();
    assert_eq!(publisher_record.status, PublisherStatus::Utilised);
    // The publisher's self-description replaced the membership-derived
    // placeholder identity.
    assert_eq!(publisher_record.identity.zone, "zone-a");
    assert_eq!(publisher_record.identity.site, "site-a");

    assert!(forwarder.call_count() >= 1);

    consumer.shutdown().await.expect("shutdown failed");
    publisher.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
async fn subscribe_is_active_immediately_when_candidate_present() {
    let _ = tracing_subscriber::fmt().try_init();

    let mesh = MemoryMesh::new();
    let publisher = start_node(
        &mesh,
        vitals_identity(),
        ScopeCapabilities::default(),
        RecordingForwarder::accepting(),
    )
    .await;
    let consumer = start_node(
        &mesh,
        consumer_identity(),
        ScopeCapabilities::default(),
        RecordingForwarder::accepting(),
    )
    .await;

    let record = consumer
        .subscribe("vitals-feed", [TopicManifest::new("VITALS")])
        .await;

    assert_eq!(record.status, SubscriptionStatus::Active);
    assert_eq!(
        consumer.publisher_status("vitals-feed(abc)").unwrap().status,
        PublisherStatus::Utilised
    );

    consumer.shutdown().await.expect("shutdown failed");
    publisher.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
async fn inter_site_subscriber_is_rejected_by_policy() {
    let _ = tracing_subscriber::fmt().try_init();

    let mesh = MemoryMesh::new();
    // Default capabilities do not allow inter-site subscribers.
    let forwarder = RecordingForwarder::accepting();
    let publisher = start_node(
        &mesh,
        vitals_identity(),
        ScopeCapabilities::default(),
        forwarder.clone(),
    )
    .await;

    let remote_consumer = start_node(
        &mesh,
        ParticipantIdentity::new("consumer", "consumer(2)", "zone-a", "site-b"),
        ScopeCapabilities::default(),
        RecordingForwarder::accepting(),
    )
    .await;

    let record = remote_consumer
        .subscribe("vitals-feed", [TopicManifest::new("VITALS")])
        .await;

    assert_eq!(record.status, SubscriptionStatus::PendingNoProviders);
    assert_eq!(record.commentary, "not supported for this relationship");
    assert_eq!(
        remote_consumer
            .publisher_status("vitals-feed(abc)")
            .unwrap()
            .status,
        PublisherStatus::NotUtilised
    );
    // Policy rejection happens before the forwarder is consulted.
    assert_eq!(forwarder.call_count(), 0);

    remote_consumer.shutdown().await.expect("shutdown failed");
    publisher.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
async fn liveness_pass_demotes_on_publisher_departure() {
    let _ = tracing_subscriber::fmt().try_init();

    let mesh = MemoryMesh::new();
    let publisher = start_node(
        &mesh,
        vitals_identity(),
        ScopeCapabilities::default(),
        RecordingForwarder::accepting(),
    )
    .await;
    let consumer = start_node(
        &mesh,
        consumer_identity(),
        ScopeCapabilities::default(),
        RecordingForwarder::accepting(),
    )
    .await;

    let record = consumer
        .subscribe("vitals-feed", [TopicManifest::new("VITALS")])
        .await;
    assert_eq!(record.status, SubscriptionStatus::Active);

    // The publisher drops out of membership.
    publisher.shutdown().await.expect("shutdown failed");

    wait_until("subscription is demoted", || {
        consumer
            .subscription_status("vitals-feed")
            .is_some_and(|s| s.status == SubscriptionStatus::PendingNoProviders)
    })
    .await;
    assert!(consumer.publisher_status("vitals-feed(abc)").is_none());

    // Durable interest: the subscription record itself survives.
    let record = consumer.subscription_status("vitals-feed").unwrap();
    assert_eq!(record.topics.len(), 1);

    consumer.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
async fn unresponsive_candidate_is_marked_failed() {
    let _ = tracing_subscriber::fmt().try_init();

    let mesh = MemoryMesh::new();
    // Joined the mesh but never answers: no RPC layer is running for it.
    let deaf = mesh.join("labs-feed(x)");

    let consumer = start_node(
        &mesh,
        consumer_identity(),
        ScopeCapabilities::default(),
        RecordingForwarder::accepting(),
    )
    .await;

    let record = consumer
        .subscribe("labs-feed", [TopicManifest::new("LABS")])
        .await;

    assert_eq!(record.status, SubscriptionStatus::PendingNoProviders);
    assert_eq!(
        consumer.publisher_status("labs-feed(x)").unwrap().status,
        PublisherStatus::Failed
    );

    drop(deaf);
    consumer.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
async fn concurrent_subscribes_merge_topic_sets() {
    let _ = tracing_subscriber::fmt().try_init();

    let mesh = MemoryMesh::new();
    let consumer = start_node(
        &mesh,
        consumer_identity(),
        ScopeCapabilities::default(),
        RecordingForwarder::accepting(),
    )
    .await;

    let (first, second) = tokio::join!(
        consumer.subscribe("vitals-feed", [TopicManifest::new("VITALS")]),
        consumer.subscribe("vitals-feed", [TopicManifest::new("ALERTS")]),
    );
    assert_eq!(first.service_name, second.service_name);

    let record = consumer.subscription_status("vitals-feed").unwrap();
    let topics: Vec<&str> = record.topics.iter().map(TopicManifest::as_str).collect();
    assert_eq!(topics, vec!["ALERTS", "VITALS"]);

    consumer.shutdown().await.expect("shutdown failed");
}

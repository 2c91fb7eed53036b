//! Unicast RPC with correlation tracking above a group transport

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use futures::StreamExt;
use meshpub_transport::{Address, Transport, TransportEnvelope};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{NetworkError, NetworkResult};

/// A request waiting for its correlated response
struct PendingRequest {
    tx: oneshot::Sender<Bytes>,
    sent_at: Instant,
}

type HandlerFuture = Pin<Box<dyn Future<Output = NetworkResult<Option<Bytes>>> + Send>>;
type RequestHandler = Arc<dyn Fn(Address, Bytes) -> HandlerFuture + Send + Sync>;

/// Configuration for the RPC manager
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Age after which an unanswered pending request is dropped
    pub stale_request_age: Duration,
    /// Interval between stale-request sweeps
    pub cleanup_interval: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            stale_request_age: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// RPC manager: typed request/response over envelope delivery
///
/// Outbound requests carry a correlation ID and block (with a bounded
/// timeout) until the matching response envelope arrives. Inbound
/// envelopes are routed to the handler registered for their method; the
/// handler's response is sent back under the same correlation ID.
pub struct RpcManager<T>
where
    T: Transport,
{
    transport: Arc<T>,
    pending: Arc<DashMap<Uuid, PendingRequest>>,
    handlers: Arc<DashMap<String, RequestHandler>>,
    task_tracker: TaskTracker,
    cancellation: CancellationToken,
    config: RpcConfig,
}

impl<T> RpcManager<T>
where
    T: Transport,
{
    /// Create a new RPC manager over the given transport
    pub fn new(transport: Arc<T>) -> Self {
        Self::with_config(transport, RpcConfig::default())
    }

    /// Create a new RPC manager with custom configuration
    pub fn with_config(transport: Arc<T>, config: RpcConfig) -> Self {
        Self {
            transport,
            pending: Arc::new(DashMap::new()),
            handlers: Arc::new(DashMap::new()),
            task_tracker: TaskTracker::new(),
            cancellation: CancellationToken::new(),
            config,
        }
    }

    /// The transport this manager routes through
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Start the router and cleanup background tasks
    pub fn start(&self) {
        {
            let transport = self.transport.clone();
            let pending = self.pending.clone();
            let handlers = self.handlers.clone();
            let cancellation = self.cancellation.clone();

            self.task_tracker.spawn(async move {
                tokio::select! {
                    () = Self::router_loop(transport, pending, handlers) => {
                        debug!("RPC router loop exited");
                    }
                    () = cancellation.cancelled() => {
                        debug!("RPC router loop cancelled");
                    }
                }
            });
        }

        {
            let pending = self.pending.clone();
            let cancellation = self.cancellation.clone();
            let config = self.config.clone();

            self.task_tracker.spawn(async move {
                tokio::select! {
                    () = Self::cleanup_loop(pending, config) => {}
                    () = cancellation.cancelled() => {
                        debug!("RPC cleanup loop cancelled");
                    }
                }
            });
        }
    }

    /// Send a typed request and wait for the typed response
    pub async fn request<Req, Resp>(
        &self,
        target: &Address,
        method: &str,
        request: &Req,
        timeout_duration: Duration,
    ) -> NetworkResult<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let correlation_id = Uuid::new_v4();
        let request_bytes = encode(request)?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            correlation_id,
            PendingRequest {
                tx,
                sent_at: Instant::now(),
            },
        );

        if let Err(e) = self
            .transport
            .send_envelope(target, &request_bytes, method, Some(correlation_id))
            .await
        {
            self.pending.remove(&correlation_id);
            return Err(NetworkError::Transport(e));
        }

        let response_bytes = match timeout(timeout_duration, rx).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(_)) => {
                self.pending.remove(&correlation_id);
                return Err(NetworkError::ChannelClosed(format!(
                    "response channel for {method} to {target} closed"
                )));
            }
            Err(_) => {
                self.pending.remove(&correlation_id);
                return Err(NetworkError::Timeout(format!(
                    "{method} to {target} timed out after {timeout_duration:?}"
                )));
            }
        };

        decode(&response_bytes)
    }

    /// Register the handler answering requests for a method
    ///
    /// At most one handler per method; a second registration replaces the
    /// first.
    pub fn register_request_handler<Req, Resp, F, Fut>(&self, method: &str, handler: F)
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Address, Req) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = NetworkResult<Resp>> + Send + 'static,
    {
        let erased: RequestHandler = Arc::new(move |sender: Address, payload: Bytes| {
            let handler = handler.clone();
            Box::pin(async move {
                let request: Req = match decode(&payload) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!("failed to decode inbound request: {}", e);
                        return Ok(None);
                    }
                };

                let response = handler(sender, request).await?;
                encode(&response).map(Some)
            }) as HandlerFuture
        });

        self.handlers.insert(method.to_string(), erased);
    }

    async fn router_loop(
        transport: Arc<T>,
        pending: Arc<DashMap<Uuid, PendingRequest>>,
        handlers: Arc<DashMap<String, RequestHandler>>,
    ) {
        debug!("RPC router loop started");
        let mut incoming = transport.incoming();

        while let Some(envelope) = incoming.next().await {
            let transport = transport.clone();
            let pending = pending.clone();
            let handlers = handlers.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::dispatch(envelope, transport, pending, handlers).await {
                    error!("error dispatching inbound envelope: {}", e);
                }
            });
        }
    }

    async fn dispatch(
        envelope: TransportEnvelope,
        transport: Arc<T>,
        pending: Arc<DashMap<Uuid, PendingRequest>>,
        handlers: Arc<DashMap<String, RequestHandler>>,
    ) -> NetworkResult<()> {
        let TransportEnvelope {
            correlation_id,
            method,
            payload,
            sender,
        } = envelope;

        // A correlated envelope with a pending entry is a response.
        if let Some(correlation_id) = correlation_id
            && let Some((_, request)) = pending.remove(&correlation_id)
        {
            debug!(
                "delivering response for correlation_id {} from {}",
                correlation_id, sender
            );
            let _ = request.tx.send(payload);
            return Ok(());
        }

        let Some(handler) = handlers.get(&method).map(|entry| Arc::clone(entry.value())) else {
            warn!(
                "no handler for method '{}' (correlation_id: {:?})",
                method, correlation_id
            );
            return Ok(());
        };

        if let Some(response_bytes) = handler(sender.clone(), payload).await? {
            transport
                .send_envelope(&sender, &response_bytes, &method, correlation_id)
                .await
                .map_err(NetworkError::Transport)?;
        }

        Ok(())
    }

    async fn cleanup_loop(pending: Arc<DashMap<Uuid, PendingRequest>>, config: RpcConfig) {
        let mut interval = tokio::time::interval(config.cleanup_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            let now = Instant::now();
            let stale: Vec<Uuid> = pending
                .iter()
                .filter(|entry| now.duration_since(entry.value().sent_at) > config.stale_request_age)
                .map(|entry| *entry.key())
                .collect();

            for id in stale {
                debug!("dropping stale pending request {}", id);
                pending.remove(&id);
            }
        }
    }

    /// Shutdown the RPC manager and its background tasks
    pub async fn shutdown(&self) {
        self.cancellation.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
    }
}

fn encode<M: Serialize>(message: &M) -> NetworkResult<Bytes> {
    let mut buf = Vec::new();
    ciborium::into_writer(message, &mut buf)
        .map_err(|e| NetworkError::Serialization(format!("failed to encode message: {e}")))?;
    Ok(Bytes::from(buf))
}

fn decode<M: DeserializeOwned>(bytes: &Bytes) -> NetworkResult<M> {
    ciborium::from_reader(bytes.as_ref())
        .map_err(|e| NetworkError::Serialization(format!("failed to decode message: {e}")))
}

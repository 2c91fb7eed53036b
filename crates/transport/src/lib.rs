//! Group-communication transport abstraction for meshpub
//!
//! This crate provides a transport-agnostic interface over a
//! group-communication substrate. A transport owns three concerns:
//! - Envelope delivery between member addresses (unicast)
//! - The live membership view of the group
//! - Membership-change notifications (join / leave / suspect)
//!
//! Concrete implementations live in separate crates; the in-process
//! `meshpub-transport-memory` implementation backs tests and local
//! development.

pub mod error;

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub use error::TransportError as Error;
pub use error::TransportError;

/// Opaque address of one member within the group.
///
/// Addresses are assigned by the transport and are only meaningful for the
/// lifetime of the member's presence in the group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Create an address from its transport-level string form
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The transport-level string form of this address
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// One entry of the group's membership view: a reachable member together
/// with the instance name it advertised when joining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Transport address the member can be reached at
    pub address: Address,
    /// Advertised instance name (`service(suffix)` convention)
    pub instance_name: String,
}

impl Member {
    /// Create a membership entry
    pub fn new(address: Address, instance_name: impl Into<String>) -> Self {
        Self {
            address,
            instance_name: instance_name.into(),
        }
    }
}

/// Membership-change notification emitted by the transport
#[derive(Debug, Clone)]
pub enum MembershipEvent {
    /// A member joined the group
    Joined(Member),
    /// A member left the group (gracefully or detected as gone)
    Left(Member),
    /// A member is suspected unreachable but has not yet been removed
    Suspected(Member),
}

impl MembershipEvent {
    /// The member the event refers to
    pub fn member(&self) -> &Member {
        match self {
            Self::Joined(m) | Self::Left(m) | Self::Suspected(m) => m,
        }
    }
}

/// Transport-level message envelope
#[derive(Debug, Clone)]
pub struct TransportEnvelope {
    /// Correlation ID for request/response tracking
    pub correlation_id: Option<Uuid>,
    /// Logical method the payload is addressed to
    pub method: String,
    /// The message payload
    pub payload: Bytes,
    /// The sender of the message
    pub sender: Address,
}

/// Group transport trait
///
/// Implementations handle envelope delivery and membership bookkeeping.
/// All failure modes surface as `TransportError`; callers above the RPC
/// layer never see a transport error directly.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// The local member's own address
    fn local_address(&self) -> Address;

    /// Send an envelope to a specific member
    async fn send_envelope(
        &self,
        recipient: &Address,
        payload: &Bytes,
        method: &str,
        correlation_id: Option<Uuid>,
    ) -> Result<(), TransportError>;

    /// Stream of incoming envelopes addressed to this member
    fn incoming(&self) -> Pin<Box<dyn Stream<Item = TransportEnvelope> + Send>>;

    /// The current membership view
    ///
    /// Always re-reads the live view; returns an empty list when the
    /// transport is unavailable rather than failing.
    async fn membership_view(&self) -> Vec<Member>;

    /// Subscribe to membership-change notifications
    fn membership_events(&self) -> broadcast::Receiver<MembershipEvent>;

    /// Shutdown the transport
    async fn shutdown(&self) -> Result<(), TransportError>;
}

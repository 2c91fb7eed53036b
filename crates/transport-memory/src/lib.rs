//! In-memory group transport for testing
//!
//! Routes envelopes between members within the same process and drives
//! membership events from explicit `join` / `leave` / `suspect` calls,
//! which makes membership-convergence scenarios fully scriptable in
//! tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::Stream;
use meshpub_transport::{
    Address, Member, MembershipEvent, Transport, TransportEnvelope, TransportError,
};
use std::pin::Pin;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-destination inbox capacity
const INBOX_CAPACITY: usize = 128;

/// Capacity of the membership-event broadcast channel
const EVENT_CAPACITY: usize = 64;

struct MemberSlot {
    member: Member,
    inbox: flume::Sender<TransportEnvelope>,
}

/// An in-process group of memory transports.
///
/// The mesh owns the membership table and the event broadcaster; each
/// `join` hands back a [`MemoryTransport`] wired into it. The mesh is an
/// explicit handle rather than process-global state so independent tests
/// never observe each other.
pub struct MemoryMesh {
    slots: DashMap<Address, MemberSlot>,
    events: broadcast::Sender<MembershipEvent>,
}

impl MemoryMesh {
    /// Create an empty mesh
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            slots: DashMap::new(),
            events,
        })
    }

    /// Join the mesh under the given advertised instance name
    pub fn join(self: &Arc<Self>, instance_name: &str) -> MemoryTransport {
        let address = Address::new(format!("mem-{}", Uuid::new_v4()));
        let member = Member::new(address.clone(), instance_name);
        let (tx, rx) = flume::bounded(INBOX_CAPACITY);

        self.slots.insert(
            address.clone(),
            MemberSlot {
                member: member.clone(),
                inbox: tx,
            },
        );

        debug!("member {} joined mesh as {}", instance_name, address);
        let _ = self.events.send(MembershipEvent::Joined(member.clone()));

        MemoryTransport {
            mesh: Arc::clone(self),
            local: member,
            inbox: rx,
            closed: AtomicBool::new(false),
        }
    }

    /// Remove a member by instance name, notifying subscribers
    pub fn leave(&self, instance_name: &str) {
        let address = self.address_of(instance_name);
        if let Some(address) = address
            && let Some((_, slot)) = self.slots.remove(&address)
        {
            debug!("member {} left mesh", instance_name);
            let _ = self.events.send(MembershipEvent::Left(slot.member));
        }
    }

    /// Flag a member as suspected without removing it from the view
    pub fn suspect(&self, instance_name: &str) {
        if let Some(address) = self.address_of(instance_name)
            && let Some(slot) = self.slots.get(&address)
        {
            let _ = self
                .events
                .send(MembershipEvent::Suspected(slot.member.clone()));
        }
    }

    /// Current members of the mesh
    pub fn members(&self) -> Vec<Member> {
        let mut members: Vec<Member> = self.slots.iter().map(|s| s.member.clone()).collect();
        members.sort_by(|a, b| a.address.cmp(&b.address));
        members
    }

    fn address_of(&self, instance_name: &str) -> Option<Address> {
        self.slots
            .iter()
            .find(|s| s.member.instance_name == instance_name)
            .map(|s| s.member.address.clone())
    }
}

/// Memory transport for one member of a [`MemoryMesh`]
pub struct MemoryTransport {
    mesh: Arc<MemoryMesh>,
    local: Member,
    inbox: flume::Receiver<TransportEnvelope>,
    closed: AtomicBool,
}

impl MemoryTransport {
    /// The member this transport represents
    pub fn local_member(&self) -> &Member {
        &self.local
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_address(&self) -> Address {
        self.local.address.clone()
    }

    async fn send_envelope(
        &self,
        recipient: &Address,
        payload: &Bytes,
        method: &str,
        correlation_id: Option<Uuid>,
    ) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Stopped);
        }

        let inbox = self
            .mesh
            .slots
            .get(recipient)
            .map(|slot| slot.inbox.clone())
            .ok_or_else(|| TransportError::UnknownRecipient(recipient.to_string()))?;

        let envelope = TransportEnvelope {
            correlation_id,
            method: method.to_string(),
            payload: payload.clone(),
            sender: self.local.address.clone(),
        };

        inbox.send_async(envelope).await.map_err(|_| {
            warn!("inbox of {} closed mid-send", recipient);
            TransportError::DeliveryFailed(format!("inbox of {recipient} closed"))
        })
    }

    fn incoming(&self) -> Pin<Box<dyn Stream<Item = TransportEnvelope> + Send>> {
        Box::pin(self.inbox.clone().into_stream())
    }

    async fn membership_view(&self) -> Vec<Member> {
        if self.is_closed() {
            return Vec::new();
        }
        self.mesh.members()
    }

    fn membership_events(&self) -> broadcast::Receiver<MembershipEvent> {
        self.mesh.events.subscribe()
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.mesh.leave(&self.local.instance_name);
        }
        Ok(())
    }
}

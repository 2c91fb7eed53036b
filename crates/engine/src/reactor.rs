//! Membership-change reactor
//!
//! Turns transport membership notifications into immediate out-of-cycle
//! sweep passes, which is what gives sub-period convergence latency when a
//! publisher joins or leaves.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use meshpub_transport::{MembershipEvent, Transport};
use tokio::sync::{Notify, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Forwards membership events to the sweeper
pub struct MembershipReactor {
    wake: Arc<Notify>,
    membership_dirty: Arc<AtomicBool>,
}

impl MembershipReactor {
    pub(crate) fn new(wake: Arc<Notify>, membership_dirty: Arc<AtomicBool>) -> Self {
        Self {
            wake,
            membership_dirty,
        }
    }

    /// Consume membership events until cancelled
    pub(crate) async fn run<T>(self, transport: Arc<T>, cancellation: CancellationToken)
    where
        T: Transport,
    {
        let mut events = transport.membership_events();

        loop {
            tokio::select! {
                () = cancellation.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => self.on_event(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Missed events are indistinguishable from a batch
                        // of changes; treat as one.
                        warn!("membership event stream lagged by {}", skipped);
                        self.membership_dirty.store(true, Ordering::SeqCst);
                        self.wake.notify_one();
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("membership event stream closed");
                        break;
                    }
                },
            }
        }

        debug!("membership reactor exiting");
    }

    fn on_event(&self, event: &MembershipEvent) {
        match event {
            MembershipEvent::Joined(member) => {
                debug!("member joined: {}", member.instance_name);
            }
            MembershipEvent::Left(member) => {
                debug!("member left: {}", member.instance_name);
            }
            MembershipEvent::Suspected(member) => {
                debug!("member suspected: {}", member.instance_name);
            }
        }
        self.membership_dirty.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }
}

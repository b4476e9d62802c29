//! In-memory paired transport.
//!
//! [`LoopbackTransport::pair`] returns two connected ends that implement the
//! three delivery channels the way a platform link does:
//!
//! - Immediate delivery succeeds only while the link is up and both ends are
//!   active.
//! - Each end's latest persistent context is handed to the peer whenever the
//!   peer is active and the link is up; intermediate values are overwritten.
//! - Guaranteed entries wait in the sender's outbox until the peer can take
//!   them, then arrive in FIFO order, complication lane first.
//!
//! Maps cross the link as MessagePack bytes.

use super::{SessionStatus, Transport, TransportError, TransportEvent, TransportEvents};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use wristlink_core::QueueLane;
use wristlink_types::WireMap;

/// One end of an in-memory link.
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    link: Arc<Mutex<Link>>,
    side: usize,
}

#[derive(Debug)]
struct Link {
    up: bool,
    paired: bool,
    complication_enabled: bool,
    ends: [End; 2],
}

#[derive(Debug)]
struct End {
    active: bool,
    reported_reachable: bool,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: Option<TransportEvents>,
    own_context: Option<WireMap>,
    received_context: Option<WireMap>,
    pending_context: Option<Vec<u8>>,
    outbox: VecDeque<(QueueLane, Vec<u8>)>,
}

impl End {
    fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            active: false,
            reported_reachable: false,
            events_tx,
            events_rx: Some(events_rx),
            own_context: None,
            received_context: None,
            pending_context: None,
            outbox: VecDeque::new(),
        }
    }

    fn emit(&self, event: TransportEvent) {
        // The receiver is gone once its endpoint shut down.
        let _ = self.events_tx.send(event);
    }
}

impl Link {
    fn reachable(&self, side: usize) -> bool {
        self.up && self.ends[side].active && self.ends[1 - side].active
    }

    /// Bring both ends up to date with the current link and session state.
    fn reconcile(&mut self) {
        for side in 0..2 {
            let reachable = self.reachable(side);
            let end = &mut self.ends[side];
            if end.active && end.reported_reachable != reachable {
                end.reported_reachable = reachable;
                end.emit(TransportEvent::ReachabilityChanged(reachable));
            }
        }

        for from in 0..2 {
            let to = 1 - from;
            if !(self.up && self.ends[to].active) {
                continue;
            }

            if let Some(bytes) = self.ends[from].pending_context.take() {
                if let Some(map) = unframe(&bytes) {
                    self.ends[to].received_context = Some(map.clone());
                    self.ends[to].emit(TransportEvent::Received(map));
                }
            }

            let outbox = std::mem::take(&mut self.ends[from].outbox);
            let (priority, standard): (Vec<_>, Vec<_>) = outbox
                .into_iter()
                .partition(|(lane, _)| *lane == QueueLane::Complication);
            for (_, bytes) in priority.into_iter().chain(standard) {
                if let Some(map) = unframe(&bytes) {
                    self.ends[to].emit(TransportEvent::Received(map));
                }
            }
        }
    }
}

fn frame(map: &WireMap) -> Result<Vec<u8>, TransportError> {
    map.to_bytes()
        .map_err(|e| TransportError::Rejected(format!("framing failed: {}", e)))
}

fn unframe(bytes: &[u8]) -> Option<WireMap> {
    match WireMap::from_bytes(bytes) {
        Ok(map) => Some(map),
        Err(e) => {
            tracing::warn!("Dropping unreadable frame on loopback link: {}", e);
            None
        }
    }
}

impl LoopbackTransport {
    /// Create two paired ends with the link up. The first end is
    /// conventionally the primary.
    pub fn pair() -> (Self, Self) {
        let link = Arc::new(Mutex::new(Link {
            up: true,
            paired: true,
            complication_enabled: false,
            ends: [End::new(), End::new()],
        }));
        (
            Self {
                link: Arc::clone(&link),
                side: 0,
            },
            Self { link, side: 1 },
        )
    }

    /// Bring the radio link up or down for both ends.
    pub fn set_link_up(&self, up: bool) {
        let mut link = self.lock();
        if link.up != up {
            tracing::debug!("Loopback link {}", if up { "up" } else { "down" });
        }
        link.up = up;
        link.reconcile();
    }

    /// Change the pairing status and notify active ends.
    pub fn set_paired(&self, paired: bool) {
        let mut link = self.lock();
        if link.paired == paired {
            return;
        }
        link.paired = paired;
        for end in link.ends.iter().filter(|end| end.active) {
            end.emit(TransportEvent::PairingChanged(paired));
        }
    }

    /// Enable or disable the complication surface.
    pub fn set_complication_enabled(&self, enabled: bool) {
        self.lock().complication_enabled = enabled;
    }

    /// Deactivate this end as if the platform had dropped the session.
    pub fn drop_session(&self) {
        let mut link = self.lock();
        let end = &mut link.ends[self.side];
        if !end.active {
            return;
        }
        tracing::debug!("Loopback session dropped on side {}", self.side);
        end.active = false;
        end.reported_reachable = false;
        end.emit(TransportEvent::Deactivated);
        link.reconcile();
    }

    /// Guaranteed entries from this end still waiting for the peer.
    pub fn queued_guaranteed(&self) -> usize {
        self.lock().ends[self.side].outbox.len()
    }

    /// Whether this end's session is active.
    pub fn is_active(&self) -> bool {
        self.lock().ends[self.side].active
    }

    fn lock(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn activate(&self) -> Result<SessionStatus, TransportError> {
        let mut link = self.lock();
        if !link.paired {
            return Err(TransportError::ActivationFailed(
                "devices not paired".to_string(),
            ));
        }

        link.ends[self.side].active = true;
        let reachable = link.reachable(self.side);
        // Reported through the completion, not as an event.
        link.ends[self.side].reported_reachable = reachable;
        link.reconcile();

        Ok(SessionStatus {
            paired: link.paired,
            reachable,
        })
    }

    async fn deactivate(&self) -> Result<(), TransportError> {
        let mut link = self.lock();
        let end = &mut link.ends[self.side];
        end.active = false;
        end.reported_reachable = false;
        link.reconcile();
        Ok(())
    }

    async fn send_immediate(&self, map: WireMap) -> Result<(), TransportError> {
        let bytes = frame(&map)?;
        let link = self.lock();
        if !link.ends[self.side].active {
            return Err(TransportError::NotActivated);
        }
        if !link.reachable(self.side) {
            return Err(TransportError::Unreachable);
        }
        if let Some(map) = unframe(&bytes) {
            link.ends[1 - self.side].emit(TransportEvent::Received(map));
        }
        Ok(())
    }

    fn set_persistent_context(&self, map: WireMap) -> Result<(), TransportError> {
        let bytes = frame(&map)?;
        let mut link = self.lock();
        let end = &mut link.ends[self.side];
        end.own_context = Some(map);
        end.pending_context = Some(bytes);
        link.reconcile();
        Ok(())
    }

    fn persistent_context(&self) -> Option<WireMap> {
        self.lock().ends[self.side].own_context.clone()
    }

    fn received_context(&self) -> Option<WireMap> {
        self.lock().ends[self.side]
            .received_context
            .clone()
    }

    fn enqueue_guaranteed(&self, map: WireMap, lane: QueueLane) -> Result<(), TransportError> {
        let bytes = frame(&map)?;
        let mut link = self.lock();
        link.ends[self.side].outbox.push_back((lane, bytes));
        link.reconcile();
        Ok(())
    }

    fn complication_enabled(&self) -> bool {
        self.lock().complication_enabled
    }

    fn take_events(&self) -> Option<TransportEvents> {
        self.lock().ends[self.side].events_rx.take()
    }
}

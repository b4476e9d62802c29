//! Transport abstraction for wristlink.
//!
//! This module describes what the engine needs from the platform's
//! device-to-device link, without implementing any radio itself.
//!
//! # Design
//!
//! The transport exposes three delivery primitives plus session control:
//! - `activate()` / `deactivate()` manage the logical session
//! - `send_immediate()` is best effort and only works while reachable
//! - `set_persistent_context()` is durable and latest-value-wins
//! - `enqueue_guaranteed()` is durable, FIFO, at-least-once
//!
//! Everything the transport reports asynchronously (inbound maps from any
//! channel, reachability, pairing, unexpected deactivation) arrives as a
//! [`TransportEvent`] on the receiver returned by `take_events()`.
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! let status = transport.activate().await?;
//! if status.reachable {
//!     transport.send_immediate(map).await?;
//! }
//! ```

mod loopback;
mod mock;

pub use loopback::LoopbackTransport;
pub use mock::{MockCall, MockTransport};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use wristlink_core::QueueLane;
use wristlink_types::WireMap;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No activated session.
    #[error("session not activated")]
    NotActivated,

    /// Peer not reachable for immediate delivery.
    #[error("peer unreachable")]
    Unreachable,

    /// Transport refused the operation.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// Session could not be activated.
    #[error("activation failed: {0}")]
    ActivationFailed(String),
}

/// Pairing and reachability reported with an activation completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    /// Devices are paired.
    pub paired: bool,
    /// Peer is reachable for immediate delivery.
    pub reachable: bool,
}

/// Callbacks from the transport, delivered in order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A map arrived over any channel.
    Received(WireMap),
    /// Reachability changed.
    ReachabilityChanged(bool),
    /// Pairing status changed.
    PairingChanged(bool),
    /// The session was deactivated without a local request.
    Deactivated,
}

/// Receiving half of the transport's event stream.
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// Transport trait for the three delivery channels and session control.
///
/// Implementations own any retry or persistence beneath these calls.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Request a session. Completes with the pairing and reachability at
    /// activation time.
    async fn activate(&self) -> Result<SessionStatus, TransportError>;

    /// Tear the session down.
    async fn deactivate(&self) -> Result<(), TransportError>;

    /// Best-effort immediate delivery.
    async fn send_immediate(&self, map: WireMap) -> Result<(), TransportError>;

    /// Replace the durable, latest-value-wins context.
    fn set_persistent_context(&self, map: WireMap) -> Result<(), TransportError>;

    /// Latest context this side wrote, if any.
    fn persistent_context(&self) -> Option<WireMap>;

    /// Latest context received from the peer, if any.
    fn received_context(&self) -> Option<WireMap>;

    /// Append to a durable FIFO queue. Fire-and-forget.
    fn enqueue_guaranteed(&self, map: WireMap, lane: QueueLane) -> Result<(), TransportError>;

    /// Whether a complication surface is enabled on the companion.
    fn complication_enabled(&self) -> bool;

    /// Take the event stream. Returns `None` after the first call.
    fn take_events(&self) -> Option<TransportEvents>;
}

//! # wristlink-client
//!
//! Cross-device sync engine for a primary device and its wrist-worn
//! companion.
//!
//! This is the library both apps embed. It keeps the two sides loosely in
//! sync over a link that is often unreachable.
//!
//! ## Features
//!
//! - **Channel selection**: Immediate while reachable, Persistent Context
//!   otherwise, Guaranteed Queue for samples and complications
//! - **Self-healing sessions**: an unexpected deactivation re-requests
//!   activation at once
//! - **Sample batching**: sensor snapshots are buffered and flushed in
//!   batches on overflow, on a timer and on shutdown
//! - **Transport abstraction**: pluggable link (loopback, mock)
//! - **Pure state machine**: uses wristlink-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use wristlink_client::{Endpoint, EngineConfig, LoopbackTransport};
//! use wristlink_types::Role;
//!
//! let (primary_link, companion_link) = LoopbackTransport::pair();
//! let primary = Endpoint::new(Role::Primary, primary_link, EngineConfig::default());
//! let companion = Endpoint::new(Role::Companion, companion_link, EngineConfig::default());
//!
//! primary.activate().await;
//! companion.activate().await;
//!
//! let mut commands = primary.inbound();
//! companion.send(&play_command);
//! let message = commands.recv().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregator;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod monitor;
pub mod router;
pub mod sensors;
pub mod transport;

pub use aggregator::{AggregatorStats, SampleAggregator};
pub use config::{AggregatorConfig, ConfigError, EndpointConfig, EngineConfig, RouterConfig};
pub use endpoint::Endpoint;
pub use error::EngineError;
pub use monitor::{ConnectionMonitor, ConnectionObserver};
pub use router::{DeliveryOutcome, DeliveryRouter};
pub use sensors::{ManualSensor, Readings, SensorSource, SensorValue};
pub use transport::{
    LoopbackTransport, MockCall, MockTransport, SessionStatus, Transport, TransportError,
    TransportEvent, TransportEvents,
};

//! # wristlink-core
//!
//! Pure logic for wristlink (no I/O, instant tests).
//!
//! This crate implements the state machine, the sample buffer and the
//! channel-selection policy of the sync engine without any transport, timer
//! or sensor I/O.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (transport calls, timers, sensor subscriptions) is performed
//! by `wristlink-client`, which interprets the actions and routes produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod routing;
pub mod state;

pub use buffer::SampleBuffer;
pub use routing::{select_route, Channel, QueueLane, Route};
pub use state::{Action, Activation, ConnectionState, Event};

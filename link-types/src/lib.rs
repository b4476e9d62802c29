//! # wristlink-types
//!
//! Wire format types for the wristlink companion-device sync protocol.
//!
//! This crate provides the foundational types shared by both endpoints:
//! - [`Message`] - The closed set of protocol messages and their payloads
//! - [`WireMap`], [`WireValue`] - The flat, transport-neutral wire representation
//! - [`encode`], [`decode`] - The discriminated-union codec between the two
//! - [`Role`], [`Direction`] - Which endpoint may send which message
//! - [`CodecError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod codec;
mod error;
mod messages;
mod wire;

pub use codec::{decode, encode};
pub use error::CodecError;
pub use messages::{
    BiometricUpdate, CommandKind, ComplicationUpdate, CrownAdjustment, Direction, Message,
    MessageKind, MoodInput, NowPlayingUpdate, PlaybackCommand, Role, StateUpdate,
};
pub use wire::{WireMap, WireValue, TYPE_KEY};

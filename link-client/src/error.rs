//! Engine-level failure taxonomy.
//!
//! None of these are returned from `send`: every failure is terminal where it
//! happens. They show up in logs and in [`DeliveryOutcome`](crate::DeliveryOutcome)
//! reports.

use thiserror::Error;
use wristlink_core::Channel;
use wristlink_types::{CodecError, MessageKind, Role};

use crate::transport::TransportError;

/// Failures the engine absorbs.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Message cannot be represented on the wire; dropped before any
    /// transport call.
    #[error("encoding failure: {0}")]
    EncodingFailure(#[source] CodecError),

    /// Session not activated.
    #[error("transport not ready")]
    TransportNotReady,

    /// The transport refused a send on the given channel.
    #[error("send rejected on {channel}: {reason}")]
    SendRejected {
        /// Channel that refused.
        channel: Channel,
        /// Transport-provided reason.
        reason: String,
    },

    /// Inbound map could not be decoded.
    #[error("decode failure: {0}")]
    DecodeFailure(#[source] CodecError),

    /// Outbound message not permitted for the sending endpoint's role.
    #[error("{role} endpoint may not send {kind}")]
    WrongDirection {
        /// Sending endpoint's role.
        role: Role,
        /// Rejected message kind.
        kind: MessageKind,
    },
}

impl EngineError {
    /// Classify a transport failure on a given channel.
    pub fn from_transport(channel: Channel, err: TransportError) -> Self {
        match err {
            TransportError::NotActivated => EngineError::TransportNotReady,
            other => EngineError::SendRejected {
                channel,
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_activated_maps_to_not_ready() {
        let err = EngineError::from_transport(Channel::Immediate, TransportError::NotActivated);
        assert!(matches!(err, EngineError::TransportNotReady));
    }

    #[test]
    fn other_transport_errors_are_rejections() {
        let err = EngineError::from_transport(Channel::Immediate, TransportError::Timeout);
        assert_eq!(
            err.to_string(),
            "send rejected on immediate: operation timed out"
        );
    }

    #[test]
    fn wrong_direction_display() {
        let err = EngineError::WrongDirection {
            role: Role::Primary,
            kind: MessageKind::Playback,
        };
        assert_eq!(
            err.to_string(),
            "primary endpoint may not send playbackCommand"
        );
    }
}

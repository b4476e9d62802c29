//! Error types for the wristlink wire format.

use thiserror::Error;

use crate::MessageKind;

/// Errors produced while converting between [`Message`](crate::Message)
/// and [`WireMap`](crate::WireMap), or while framing a map as bytes.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Message is not representable on the wire (non-finite number,
    /// out-of-range field). Never produced for well-formed messages.
    #[error("cannot encode {kind}: field `{field}` {reason}")]
    Encoding {
        /// Kind of the rejected message.
        kind: MessageKind,
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The discriminator is absent, not a string, or names no known variant.
    #[error("unknown message variant: {0}")]
    UnknownVariant(String),

    /// A required field is missing, mistyped, or out of range.
    #[error("malformed {kind} payload: field `{field}` {reason}")]
    MalformedPayload {
        /// Variant named by the discriminator.
        kind: MessageKind,
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// MessagePack serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] rmp_serde::decode::Error),
}

impl CodecError {
    /// Whether this error arose while decoding an inbound map.
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            CodecError::UnknownVariant(_)
                | CodecError::MalformedPayload { .. }
                | CodecError::Deserialization(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CodecError::UnknownVariant("bogus".into());
        assert_eq!(err.to_string(), "unknown message variant: bogus");

        let err = CodecError::MalformedPayload {
            kind: MessageKind::Mood,
            field: "moodLevel",
            reason: "is missing".into(),
        };
        assert_eq!(
            err.to_string(),
            "malformed moodInput payload: field `moodLevel` is missing"
        );
    }

    #[test]
    fn encoding_is_not_a_decode_failure() {
        let err = CodecError::Encoding {
            kind: MessageKind::Crown,
            field: "delta",
            reason: "must be finite",
        };
        assert!(!err.is_decode_failure());
        assert!(CodecError::UnknownVariant("<missing>".into()).is_decode_failure());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CodecError>();
    }
}

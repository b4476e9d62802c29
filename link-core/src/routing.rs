//! Channel-selection policy for wristlink.
//!
//! Latency-sensitive UI state goes over the Immediate channel while the peer
//! is reachable and falls back to the Persistent Context, where only the
//! latest value matters. Biometric samples and complication payloads always
//! use the Guaranteed Queue so nothing is silently dropped.

use std::fmt;

use wristlink_types::MessageKind;

use crate::ConnectionState;

/// Delivery channel offered by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Best-effort, low latency, only while reachable.
    Immediate,
    /// Durable, latest-value-wins.
    PersistentContext,
    /// Durable, FIFO, at-least-once.
    GuaranteedQueue(QueueLane),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Immediate => f.write_str("immediate"),
            Channel::PersistentContext => f.write_str("persistent-context"),
            Channel::GuaranteedQueue(QueueLane::Standard) => f.write_str("guaranteed-queue"),
            Channel::GuaranteedQueue(QueueLane::Complication) => {
                f.write_str("guaranteed-queue/complication")
            }
        }
    }
}

/// Sub-queue of the Guaranteed Queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueLane {
    /// Regular FIFO queue.
    Standard,
    /// Priority lane for complication payloads.
    Complication,
}

/// Routing decision for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Try Immediate; on failure fall back once to Persistent Context.
    Immediate,
    /// Write the Persistent Context.
    PersistentContext,
    /// Enqueue on the given Guaranteed Queue lane.
    Guaranteed(QueueLane),
}

impl Route {
    /// First channel attempted.
    pub fn channel(&self) -> Channel {
        match self {
            Route::Immediate => Channel::Immediate,
            Route::PersistentContext => Channel::PersistentContext,
            Route::Guaranteed(lane) => Channel::GuaranteedQueue(*lane),
        }
    }

    /// Channel used if the first attempt is rejected.
    pub fn fallback(&self) -> Option<Channel> {
        match self {
            Route::Immediate => Some(Channel::PersistentContext),
            Route::PersistentContext | Route::Guaranteed(_) => None,
        }
    }
}

/// Pick the route for a message kind given the current connection state.
///
/// `complication_enabled` is the transport's report of whether a
/// complication surface is installed on the companion.
pub fn select_route(
    kind: MessageKind,
    state: &ConnectionState,
    complication_enabled: bool,
) -> Route {
    match kind {
        MessageKind::Biometric => Route::Guaranteed(QueueLane::Standard),
        MessageKind::Complication if complication_enabled => {
            Route::Guaranteed(QueueLane::Complication)
        }
        MessageKind::Complication => Route::Guaranteed(QueueLane::Standard),
        MessageKind::NowPlaying
        | MessageKind::State
        | MessageKind::Mood
        | MessageKind::Playback
        | MessageKind::Crown => {
            if state.can_send_immediate() {
                Route::Immediate
            } else {
                Route::PersistentContext
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Activation;

    fn state(activation: Activation, reachable: bool) -> ConnectionState {
        ConnectionState {
            activation,
            reachable,
            paired: true,
        }
    }

    const LATEST_VALUE_KINDS: [MessageKind; 5] = [
        MessageKind::NowPlaying,
        MessageKind::State,
        MessageKind::Mood,
        MessageKind::Playback,
        MessageKind::Crown,
    ];

    #[test]
    fn latest_value_kinds_use_immediate_when_reachable() {
        let reachable = state(Activation::Activated, true);
        for kind in LATEST_VALUE_KINDS {
            let route = select_route(kind, &reachable, false);
            assert_eq!(route, Route::Immediate, "{kind}");
            assert_eq!(route.fallback(), Some(Channel::PersistentContext));
        }
    }

    #[test]
    fn latest_value_kinds_use_context_when_unreachable() {
        let unreachable = state(Activation::Activated, false);
        for kind in LATEST_VALUE_KINDS {
            assert_eq!(
                select_route(kind, &unreachable, false),
                Route::PersistentContext,
                "{kind}"
            );
        }
    }

    #[test]
    fn inactive_session_never_routes_immediate() {
        // reachable without activation cannot come out of the state machine,
        // but the policy must not trust it either.
        let inconsistent = state(Activation::Activating, true);
        assert_eq!(
            select_route(MessageKind::NowPlaying, &inconsistent, false),
            Route::PersistentContext
        );
    }

    #[test]
    fn biometrics_always_guaranteed() {
        for reachable in [true, false] {
            let route = select_route(
                MessageKind::Biometric,
                &state(Activation::Activated, reachable),
                true,
            );
            assert_eq!(route, Route::Guaranteed(QueueLane::Standard));
            assert_eq!(route.fallback(), None);
        }
    }

    #[test]
    fn complication_lane_depends_on_surface() {
        let s = state(Activation::Activated, true);
        assert_eq!(
            select_route(MessageKind::Complication, &s, true),
            Route::Guaranteed(QueueLane::Complication)
        );
        assert_eq!(
            select_route(MessageKind::Complication, &s, false),
            Route::Guaranteed(QueueLane::Standard)
        );
    }

    #[test]
    fn channel_display() {
        assert_eq!(Channel::Immediate.to_string(), "immediate");
        assert_eq!(
            Channel::GuaranteedQueue(QueueLane::Complication).to_string(),
            "guaranteed-queue/complication"
        );
    }
}

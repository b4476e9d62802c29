//! Connection state machine for wristlink.
//!
//! This module provides a pure, side-effect-free state machine for the
//! session with the remote endpoint. The state machine takes events as input
//! and produces a new state plus a list of actions to execute.
//!
//! Every event originates from a transport callback or a local request; the
//! machine never invents a state on its own. The actual I/O (activating,
//! tearing down) is performed by the connection monitor in wristlink-client.

/// Session activation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Activation {
    /// No session. Initial state, and the state after a failed activation.
    #[default]
    Inactive,
    /// Activation requested, completion pending.
    Activating,
    /// Session established.
    Activated,
}

/// Published connection state - NO I/O, just state transitions.
///
/// `reachable` is only ever true while `Activated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionState {
    /// Session phase.
    pub activation: Activation,
    /// Whether the Immediate channel is usable right now.
    pub reachable: bool,
    /// Whether the devices are paired, mirrored from the transport.
    pub paired: bool,
}

impl ConnectionState {
    /// Create a new state machine in the Inactive state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller is responsible
    /// for executing the returned actions.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        use Activation::*;

        match (self.activation, event) {
            // From Inactive
            (Inactive, Event::ActivationRequested) => (
                Self {
                    activation: Activating,
                    reachable: false,
                    ..self
                },
                vec![Action::RequestActivation],
            ),
            // Completion for a session we already gave up on.
            (Inactive, Event::ActivationSucceeded { .. }) => (self, vec![Action::TearDown]),

            // From Activating
            (Activating, Event::ActivationSucceeded { paired, reachable }) => (
                Self {
                    activation: Activated,
                    reachable,
                    paired,
                },
                vec![],
            ),
            (Activating, Event::ActivationFailed { error }) => (
                Self {
                    activation: Inactive,
                    reachable: false,
                    ..self
                },
                vec![Action::ReportActivationFailure { error }],
            ),

            // From Activated
            (Activated, Event::ReachabilityChanged { reachable }) => {
                (Self { reachable, ..self }, vec![])
            }
            // Self-healing: an unexpected deactivation immediately re-requests.
            (Activated, Event::SessionDeactivated) => (
                Self {
                    activation: Activating,
                    reachable: false,
                    ..self
                },
                vec![Action::RequestActivation],
            ),

            // Local teardown from any live phase
            (Activating | Activated, Event::DeactivateRequested) => (
                Self {
                    activation: Inactive,
                    reachable: false,
                    ..self
                },
                vec![Action::TearDown],
            ),

            // Pairing is status only, mirrored in every phase
            (_, Event::PairingChanged { paired }) => (Self { paired, ..self }, vec![]),

            // Invalid transitions - stay in current state
            (_, _) => (self, vec![]),
        }
    }

    /// Check if the session is activated.
    pub fn is_activated(&self) -> bool {
        self.activation == Activation::Activated
    }

    /// Check if the Immediate channel may be attempted.
    pub fn can_send_immediate(&self) -> bool {
        self.is_activated() && self.reachable
    }
}

/// Events that can occur in the session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Local request to establish the session.
    ActivationRequested,
    /// Transport reported activation success.
    ActivationSucceeded {
        /// Pairing status at completion.
        paired: bool,
        /// Reachability at completion.
        reachable: bool,
    },
    /// Transport reported activation failure.
    ActivationFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// Transport reported a reachability change.
    ReachabilityChanged {
        /// New reachability.
        reachable: bool,
    },
    /// Transport reported a pairing change.
    PairingChanged {
        /// New pairing status.
        paired: bool,
    },
    /// Transport reported that the session was deactivated under us.
    SessionDeactivated,
    /// Local request to tear the session down.
    DeactivateRequested,
}

/// Actions to be executed by the connection monitor.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Ask the transport to activate a session.
    RequestActivation,
    /// Ask the transport to tear the session down.
    TearDown,
    /// Activation failed; report it (non-fatal).
    ReportActivationFailure {
        /// Error message describing the failure.
        error: String,
    },
}

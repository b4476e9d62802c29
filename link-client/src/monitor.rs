//! Connection monitor.
//!
//! Drives the pure [`ConnectionState`] machine from wristlink-core with
//! transport callbacks and executes the actions it returns. The latest state
//! is published on a `watch` channel for the router, and registered
//! observers are called synchronously on every change.

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;
use wristlink_core::{Action, ConnectionState, Event};

use crate::transport::{Transport, TransportEvent};

/// Receives every connection state change.
pub trait ConnectionObserver: Send + Sync {
    /// Called after the state changed, with the new state.
    fn on_change(&self, state: &ConnectionState);
}

impl<F> ConnectionObserver for F
where
    F: Fn(&ConnectionState) + Send + Sync,
{
    fn on_change(&self, state: &ConnectionState) {
        self(state)
    }
}

/// Tracks pairing, activation and reachability for one endpoint.
///
/// Cloning is cheap; clones share the same state.
pub struct ConnectionMonitor<T: Transport> {
    inner: Arc<MonitorInner<T>>,
}

struct MonitorInner<T> {
    transport: Arc<T>,
    state: watch::Sender<ConnectionState>,
    observers: RwLock<Vec<Arc<dyn ConnectionObserver>>>,
}

impl<T: Transport> Clone for ConnectionMonitor<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> ConnectionMonitor<T> {
    /// Create a monitor in the Inactive state.
    pub fn new(transport: Arc<T>) -> Self {
        let (state, _) = watch::channel(ConnectionState::new());
        Self {
            inner: Arc::new(MonitorInner {
                transport,
                state,
                observers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Latest published state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Register an observer. It is called synchronously on every change.
    pub fn add_observer(&self, observer: Arc<dyn ConnectionObserver>) {
        self.inner
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Ask the transport for a session and wait for its completion.
    ///
    /// Failure is non-fatal: it is logged and the state returns to Inactive.
    pub async fn request_activation(&self) -> ConnectionState {
        let actions = self.apply(Event::ActivationRequested);
        self.run(actions).await;
        self.state()
    }

    /// Feed one transport callback into the state machine.
    ///
    /// Inbound maps are not connection events and are ignored here.
    pub async fn handle_event(&self, event: &TransportEvent) {
        let event = match event {
            TransportEvent::ReachabilityChanged(reachable) => Event::ReachabilityChanged {
                reachable: *reachable,
            },
            TransportEvent::PairingChanged(paired) => Event::PairingChanged { paired: *paired },
            TransportEvent::Deactivated => {
                tracing::warn!("Transport deactivated the session");
                Event::SessionDeactivated
            }
            TransportEvent::Received(_) => return,
        };
        let actions = self.apply(event);
        self.run(actions).await;
    }

    /// Tear the session down. No reactivation follows.
    pub async fn deactivate(&self) {
        let actions = self.apply(Event::DeactivateRequested);
        self.run(actions).await;
    }

    /// Run one event through the state machine, publish and notify.
    fn apply(&self, event: Event) -> Vec<Action> {
        let mut actions = Vec::new();
        let changed = self.inner.state.send_if_modified(|state| {
            let (next, out) = state.on_event(event);
            actions = out;
            let changed = next != *state;
            *state = next;
            changed
        });

        if changed {
            let state = self.state();
            tracing::debug!(
                activation = ?state.activation,
                reachable = state.reachable,
                paired = state.paired,
                "Connection state changed"
            );
            let observers = self
                .inner
                .observers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            for observer in observers {
                observer.on_change(&state);
            }
        }
        actions
    }

    /// Execute actions until the machine stops producing them.
    async fn run(&self, actions: Vec<Action>) {
        let mut queue: VecDeque<Action> = actions.into();
        while let Some(action) = queue.pop_front() {
            match action {
                Action::RequestActivation => {
                    let event = match self.inner.transport.activate().await {
                        Ok(status) => {
                            tracing::info!(
                                paired = status.paired,
                                reachable = status.reachable,
                                "Session activated"
                            );
                            Event::ActivationSucceeded {
                                paired: status.paired,
                                reachable: status.reachable,
                            }
                        }
                        Err(e) => Event::ActivationFailed {
                            error: e.to_string(),
                        },
                    };
                    queue.extend(self.apply(event));
                }
                Action::TearDown => {
                    if let Err(e) = self.inner.transport.deactivate().await {
                        tracing::warn!("Session teardown failed: {}", e);
                    }
                }
                Action::ReportActivationFailure { error } => {
                    tracing::warn!("Session activation failed: {}", error);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use std::sync::Mutex;
    use wristlink_core::Activation;

    fn monitor() -> (ConnectionMonitor<MockTransport>, MockTransport) {
        let transport = MockTransport::new();
        (ConnectionMonitor::new(Arc::new(transport.clone())), transport)
    }

    fn record(monitor: &ConnectionMonitor<MockTransport>) -> Arc<Mutex<Vec<ConnectionState>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        monitor.add_observer(Arc::new(move |state: &ConnectionState| {
            sink.lock().unwrap().push(*state);
        }));
        seen
    }

    #[tokio::test]
    async fn starts_inactive() {
        let (monitor, transport) = monitor();
        assert_eq!(monitor.state(), ConnectionState::new());
        assert_eq!(transport.activation_calls(), 0);
    }

    #[tokio::test]
    async fn activation_success_mirrors_completion() {
        let (monitor, transport) = monitor();
        transport.set_session(true, false);
        let seen = record(&monitor);

        let state = monitor.request_activation().await;

        assert_eq!(state.activation, Activation::Activated);
        assert!(state.paired);
        assert!(!state.reachable);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].activation, Activation::Activating);
        assert_eq!(seen[1].activation, Activation::Activated);
    }

    #[tokio::test]
    async fn activation_failure_is_non_fatal() {
        let (monitor, transport) = monitor();
        transport.fail_next_activation("not paired");

        let state = monitor.request_activation().await;
        assert_eq!(state.activation, Activation::Inactive);

        // A later request works.
        let state = monitor.request_activation().await;
        assert!(state.is_activated());
        assert_eq!(transport.activation_calls(), 2);
    }

    #[tokio::test]
    async fn reachability_notifications_only_on_change() {
        let (monitor, _transport) = monitor();
        monitor.request_activation().await;
        let seen = record(&monitor);

        monitor
            .handle_event(&TransportEvent::ReachabilityChanged(true))
            .await;
        assert!(seen.lock().unwrap().is_empty());

        monitor
            .handle_event(&TransportEvent::ReachabilityChanged(false))
            .await;
        assert!(!monitor.state().reachable);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pairing_change_is_mirrored() {
        let (monitor, _transport) = monitor();
        monitor.request_activation().await;

        monitor
            .handle_event(&TransportEvent::PairingChanged(false))
            .await;

        assert!(!monitor.state().paired);
        assert!(monitor.state().is_activated());
    }

    #[tokio::test]
    async fn unexpected_deactivation_reactivates() {
        let (monitor, transport) = monitor();
        monitor.request_activation().await;
        let seen = record(&monitor);

        monitor.handle_event(&TransportEvent::Deactivated).await;

        assert!(monitor.state().is_activated());
        assert_eq!(transport.activation_calls(), 2);
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].activation, Activation::Activating);
        assert_eq!(seen[1].activation, Activation::Activated);
    }

    #[tokio::test]
    async fn reactivation_failure_settles_inactive() {
        let (monitor, transport) = monitor();
        monitor.request_activation().await;
        transport.fail_next_activation("radio off");

        monitor.handle_event(&TransportEvent::Deactivated).await;

        assert_eq!(monitor.state().activation, Activation::Inactive);
        assert_eq!(transport.activation_calls(), 2);
    }

    #[tokio::test]
    async fn local_deactivation_tears_down_once() {
        let (monitor, transport) = monitor();
        monitor.request_activation().await;

        monitor.deactivate().await;
        assert_eq!(monitor.state().activation, Activation::Inactive);
        assert_eq!(transport.deactivation_calls(), 1);

        // Late platform callback does not resurrect the session.
        monitor.handle_event(&TransportEvent::Deactivated).await;
        assert_eq!(transport.activation_calls(), 1);

        // Deactivating again is a no-op.
        monitor.deactivate().await;
        assert_eq!(transport.deactivation_calls(), 1);
    }

    #[tokio::test]
    async fn subscribers_see_latest_state() {
        let (monitor, _transport) = monitor();
        let mut rx = monitor.subscribe();

        monitor.request_activation().await;

        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_activated());
    }

    #[tokio::test]
    async fn inbound_maps_are_ignored() {
        let (monitor, _transport) = monitor();
        let seen = record(&monitor);

        monitor
            .handle_event(&TransportEvent::Received(Default::default()))
            .await;

        assert!(seen.lock().unwrap().is_empty());
    }
}

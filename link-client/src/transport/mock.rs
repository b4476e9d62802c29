//! Mock transport for testing.
//!
//! Records every call per channel and allows forcing failures, so tests can
//! assert exactly which channels a message touched.

use super::{SessionStatus, Transport, TransportError, TransportEvent, TransportEvents};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use wristlink_core::QueueLane;
use wristlink_types::WireMap;

/// A transport call, in the order [`MockTransport::calls`] saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCall {
    /// activate()
    Activate,
    /// deactivate()
    Deactivate,
    /// send_immediate()
    Immediate,
    /// set_persistent_context()
    Context,
    /// enqueue_guaranteed() on the given lane
    Enqueue(QueueLane),
}

/// Mock transport for testing.
///
/// Clones share state, so a test can keep a handle after giving one to an
/// endpoint.
#[derive(Debug)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug)]
struct MockTransportInner {
    active: bool,
    session: SessionStatus,
    complication_enabled: bool,
    activation_calls: usize,
    deactivation_calls: usize,
    immediate_attempts: usize,
    immediate_sent: Vec<WireMap>,
    context_writes: Vec<WireMap>,
    received_context: Option<WireMap>,
    guaranteed: Vec<(QueueLane, WireMap)>,
    calls: Vec<MockCall>,
    fail_next_activation: Option<String>,
    fail_next_immediate: Option<String>,
    fail_all_immediate: Option<String>,
    fail_next_context: Option<String>,
    fail_next_enqueue: Option<String>,
    immediate_delay: Option<Duration>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: Option<TransportEvents>,
}

impl Default for MockTransportInner {
    fn default() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            active: false,
            session: SessionStatus {
                paired: true,
                reachable: true,
            },
            complication_enabled: false,
            activation_calls: 0,
            deactivation_calls: 0,
            immediate_attempts: 0,
            immediate_sent: Vec::new(),
            context_writes: Vec::new(),
            received_context: None,
            guaranteed: Vec::new(),
            calls: Vec::new(),
            fail_next_activation: None,
            fail_next_immediate: None,
            fail_all_immediate: None,
            fail_next_context: None,
            fail_next_enqueue: None,
            immediate_delay: None,
            events_tx,
            events_rx: Some(events_rx),
        }
    }
}

impl MockTransport {
    /// Create a new mock transport. Activation succeeds as paired and
    /// reachable by default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the status reported by the next activations.
    pub fn set_session(&self, paired: bool, reachable: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.session = SessionStatus { paired, reachable };
    }

    /// Report a complication surface as enabled or not.
    pub fn set_complication_enabled(&self, enabled: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.complication_enabled = enabled;
    }

    /// Push an event as if the platform had called back.
    pub fn emit(&self, event: TransportEvent) {
        let inner = self.inner.lock().unwrap();
        // Receiver may already be gone after shutdown.
        let _ = inner.events_tx.send(event);
    }

    /// Store a context as if the peer had written it.
    pub fn set_received_context(&self, map: WireMap) {
        let mut inner = self.inner.lock().unwrap();
        inner.received_context = Some(map);
    }

    /// Cause the next activate() to fail with the given error.
    pub fn fail_next_activation(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_activation = Some(error.to_string());
    }

    /// Cause the next send_immediate() to be rejected.
    pub fn fail_next_immediate(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_immediate = Some(error.to_string());
    }

    /// Reject every send_immediate() until cleared with `None`.
    pub fn fail_all_immediate(&self, error: Option<&str>) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_all_immediate = error.map(str::to_string);
    }

    /// Cause the next set_persistent_context() to fail.
    pub fn fail_next_context(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_context = Some(error.to_string());
    }

    /// Cause the next enqueue_guaranteed() to fail.
    pub fn fail_next_enqueue(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_enqueue = Some(error.to_string());
    }

    /// Delay every send_immediate() by the given duration.
    pub fn delay_immediate(&self, delay: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.immediate_delay = Some(delay);
    }

    /// Whether the mock session is active.
    pub fn is_active(&self) -> bool {
        self.inner.lock().unwrap().active
    }

    /// Number of activate() calls.
    pub fn activation_calls(&self) -> usize {
        self.inner.lock().unwrap().activation_calls
    }

    /// Number of deactivate() calls.
    pub fn deactivation_calls(&self) -> usize {
        self.inner.lock().unwrap().deactivation_calls
    }

    /// Number of send_immediate() calls, successful or not.
    pub fn immediate_attempts(&self) -> usize {
        self.inner.lock().unwrap().immediate_attempts
    }

    /// Maps accepted by send_immediate().
    pub fn immediate_sent(&self) -> Vec<WireMap> {
        self.inner.lock().unwrap().immediate_sent.clone()
    }

    /// Every accepted persistent-context write, oldest first.
    pub fn context_writes(&self) -> Vec<WireMap> {
        self.inner.lock().unwrap().context_writes.clone()
    }

    /// Every accepted guaranteed enqueue, oldest first.
    pub fn guaranteed(&self) -> Vec<(QueueLane, WireMap)> {
        self.inner.lock().unwrap().guaranteed.clone()
    }

    /// Number of accepted guaranteed enqueues.
    pub fn guaranteed_count(&self) -> usize {
        self.inner.lock().unwrap().guaranteed.len()
    }

    /// Every transport call, accepted or not, oldest first.
    pub fn calls(&self) -> Vec<MockCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Clear recorded calls, keeping the session and event stream.
    pub fn clear_records(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.clear();
        inner.immediate_attempts = 0;
        inner.immediate_sent.clear();
        inner.context_writes.clear();
        inner.guaranteed.clear();
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockTransportInner::default())),
        }
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn activate(&self) -> Result<SessionStatus, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.activation_calls += 1;
        inner.calls.push(MockCall::Activate);

        // Check for forced failure
        if let Some(error) = inner.fail_next_activation.take() {
            return Err(TransportError::ActivationFailed(error));
        }

        inner.active = true;
        Ok(inner.session)
    }

    async fn deactivate(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.deactivation_calls += 1;
        inner.calls.push(MockCall::Deactivate);
        inner.active = false;
        Ok(())
    }

    async fn send_immediate(&self, map: WireMap) -> Result<(), TransportError> {
        let delay = {
            let mut inner = self.inner.lock().unwrap();
            inner.immediate_attempts += 1;
            inner.calls.push(MockCall::Immediate);
            inner.immediate_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock().unwrap();

        if !inner.active {
            return Err(TransportError::NotActivated);
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next_immediate.take() {
            return Err(TransportError::Rejected(error));
        }
        if let Some(error) = inner.fail_all_immediate.clone() {
            return Err(TransportError::Rejected(error));
        }

        inner.immediate_sent.push(map);
        Ok(())
    }

    fn set_persistent_context(&self, map: WireMap) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(MockCall::Context);
        if let Some(error) = inner.fail_next_context.take() {
            return Err(TransportError::Rejected(error));
        }
        inner.context_writes.push(map);
        Ok(())
    }

    fn persistent_context(&self) -> Option<WireMap> {
        self.inner.lock().unwrap().context_writes.last().cloned()
    }

    fn received_context(&self) -> Option<WireMap> {
        self.inner.lock().unwrap().received_context.clone()
    }

    fn enqueue_guaranteed(&self, map: WireMap, lane: QueueLane) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(MockCall::Enqueue(lane));
        if let Some(error) = inner.fail_next_enqueue.take() {
            return Err(TransportError::Rejected(error));
        }
        inner.guaranteed.push((lane, map));
        Ok(())
    }

    fn complication_enabled(&self) -> bool {
        self.inner.lock().unwrap().complication_enabled
    }

    fn take_events(&self) -> Option<TransportEvents> {
        self.inner.lock().unwrap().events_rx.take()
    }
}

//! Endpoint - the per-device façade.
//!
//! The primary and the companion each own one [`Endpoint`]. It wires the
//! connection monitor, delivery router, inbound decoding and, on the
//! companion, the sample aggregator around a single transport.
//!
//! ```text
//! sensors → SampleAggregator → DeliveryRouter → codec → Transport
//! Transport → codec → inbound stream → consumers
//! ```
//!
//! # Example
//!
//! ```ignore
//! let (primary, companion) = LoopbackTransport::pair();
//! let endpoint = Endpoint::new(Role::Primary, primary, EngineConfig::default());
//! let mut inbound = endpoint.inbound();
//!
//! endpoint.activate().await;
//! endpoint.send(&Message::State(StateUpdate::default()));
//! let command = inbound.recv().await?;
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use wristlink_core::ConnectionState;
use wristlink_types::{decode, Message, Role, WireMap};

use crate::aggregator::{AggregatorStats, SampleAggregator};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::monitor::{ConnectionMonitor, ConnectionObserver};
use crate::router::{DeliveryOutcome, DeliveryRouter};
use crate::sensors::SensorSource;
use crate::transport::{Transport, TransportEvent, TransportEvents};

/// One side of the link.
pub struct Endpoint<T: Transport> {
    role: Role,
    config: EngineConfig,
    transport: Arc<T>,
    monitor: ConnectionMonitor<T>,
    router: DeliveryRouter<T>,
    inbound: broadcast::Sender<Message>,
    pump: Mutex<Option<JoinHandle<()>>>,
    aggregator: tokio::sync::Mutex<Option<SampleAggregator>>,
}

impl<T: Transport> Endpoint<T> {
    /// Create an endpoint. Nothing happens on the transport until
    /// [`activate`](Self::activate).
    pub fn new(role: Role, transport: T, config: EngineConfig) -> Self {
        let transport = Arc::new(transport);
        let monitor = ConnectionMonitor::new(Arc::clone(&transport));
        let router = DeliveryRouter::new(Arc::clone(&transport), monitor.subscribe(), &config.router);
        let (inbound, _) = broadcast::channel(config.endpoint.inbound_capacity.max(1));
        Self {
            role,
            config,
            transport,
            monitor,
            router,
            inbound,
            pump: Mutex::new(None),
            aggregator: tokio::sync::Mutex::new(None),
        }
    }

    /// This endpoint's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Start listening to the transport and request a session.
    ///
    /// On the first call, the peer context the transport retained from
    /// earlier sessions is published on the inbound stream before the
    /// session is requested. Activation failure is logged, not returned;
    /// the returned state tells what happened.
    pub async fn activate(&self) -> ConnectionState {
        if let Some(events) = self.transport.take_events() {
            if let Some(map) = self.transport.received_context() {
                tracing::debug!(role = %self.role, "Replaying retained peer context");
                publish(&self.inbound, &map);
            }
            self.start_pump(events);
        }

        tracing::info!(role = %self.role, "Activating endpoint");
        self.monitor.request_activation().await
    }

    /// Send a message without waiting for delivery.
    ///
    /// Messages the role may not send are logged and dropped.
    pub fn send(&self, message: &Message) {
        if let Err(e) = self.check_direction(message) {
            tracing::warn!("Dropping outbound message: {}", e);
            return;
        }
        self.router.send(message);
    }

    /// Send a message and report what happened to it.
    pub async fn deliver(&self, message: &Message) -> DeliveryOutcome {
        if let Err(e) = self.check_direction(message) {
            tracing::warn!("Dropping outbound message: {}", e);
            return DeliveryOutcome::Dropped(e);
        }
        self.router.deliver(message).await
    }

    /// Subscribe to decoded inbound messages.
    ///
    /// Undecodable maps never appear here. The stream holds
    /// `endpoint.inbound_capacity` messages; a subscriber that falls further
    /// behind gets `RecvError::Lagged` and misses the oldest ones, biometric
    /// samples included. Size the capacity above the companion's
    /// `max_batch_size` so a whole flushed batch fits.
    pub fn inbound(&self) -> broadcast::Receiver<Message> {
        self.inbound.subscribe()
    }

    /// Latest connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.monitor.state()
    }

    /// Watch connection state changes.
    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.monitor.subscribe()
    }

    /// Register a synchronous connection observer.
    pub fn add_connection_observer(&self, observer: Arc<dyn ConnectionObserver>) {
        self.monitor.add_observer(observer);
    }

    /// Start batching sensor samples toward the primary.
    ///
    /// Only the companion monitors sensors; on the primary this is a no-op.
    /// Returns whether monitoring is running afterwards.
    pub async fn start_monitoring(&self, sources: Vec<Arc<dyn SensorSource>>) -> bool {
        if self.role != Role::Companion {
            tracing::warn!(role = %self.role, "Sensor monitoring is companion-only");
            return false;
        }

        let mut aggregator = self.aggregator.lock().await;
        if aggregator.is_none() {
            *aggregator = Some(SampleAggregator::start(
                self.router.clone(),
                sources,
                &self.config.aggregator,
            ));
        }
        true
    }

    /// Stop monitoring, flushing buffered samples first.
    pub async fn stop_monitoring(&self) -> Option<AggregatorStats> {
        let aggregator = self.aggregator.lock().await.take()?;
        Some(aggregator.stop().await)
    }

    /// Aggregator counters, if monitoring.
    pub async fn aggregator_stats(&self) -> Option<AggregatorStats> {
        match self.aggregator.lock().await.as_ref() {
            Some(aggregator) => aggregator.stats().await,
            None => None,
        }
    }

    /// Stop the aggregator, then tear down the session.
    pub async fn deactivate(&self) {
        if let Some(stats) = self.stop_monitoring().await {
            tracing::debug!(
                "Final aggregator stats: {} samples, {} flushes",
                stats.samples_submitted,
                stats.flushes
            );
        }
        self.monitor.deactivate().await;
        tracing::info!(role = %self.role, "Endpoint deactivated");
    }

    fn check_direction(&self, message: &Message) -> Result<(), EngineError> {
        if self.role.may_send(message) {
            Ok(())
        } else {
            Err(EngineError::WrongDirection {
                role: self.role,
                kind: message.kind(),
            })
        }
    }

    fn start_pump(&self, events: TransportEvents) {
        let handle = tokio::spawn(pump(events, self.monitor.clone(), self.inbound.clone()));
        let mut pump = self.pump.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = pump.replace(handle) {
            old.abort();
        }
    }
}

impl<T: Transport> Drop for Endpoint<T> {
    fn drop(&mut self) {
        let pump = self.pump.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = pump.take() {
            handle.abort();
        }
        if self.aggregator.get_mut().take().is_some() {
            tracing::debug!(role = %self.role, "Endpoint dropped while monitoring");
        }
    }
}

/// Route transport callbacks until the transport closes the stream.
async fn pump<T: Transport>(
    mut events: TransportEvents,
    monitor: ConnectionMonitor<T>,
    inbound: broadcast::Sender<Message>,
) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Received(map) => publish(&inbound, &map),
            other => monitor.handle_event(&other).await,
        }
    }
    tracing::debug!("Transport event stream closed");
}

fn publish(inbound: &broadcast::Sender<Message>, map: &WireMap) {
    match decode(map) {
        Ok(message) => {
            tracing::debug!(kind = %message.kind(), "Inbound message");
            // No subscribers is fine.
            let _ = inbound.send(message);
        }
        Err(e) => {
            tracing::warn!("Discarding inbound map: {}", EngineError::DecodeFailure(e));
        }
    }
}

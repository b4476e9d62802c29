//! Delivery router.
//!
//! Encodes a message, picks its channel from the latest published
//! [`ConnectionState`] and invokes the transport. An Immediate failure falls
//! back exactly once to the Persistent Context; nothing is retried.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use wristlink_core::{select_route, Channel, ConnectionState, QueueLane, Route};
use wristlink_types::{encode, Message, MessageKind, WireMap};

use crate::config::RouterConfig;
use crate::error::EngineError;
use crate::transport::{Transport, TransportError};

/// What happened to one message.
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// Accepted by the transport on the given channel.
    Sent(Channel),
    /// Immediate failed; the Persistent Context accepted it instead.
    FellBack {
        /// Why the Immediate attempt failed.
        reason: EngineError,
    },
    /// Not delivered anywhere.
    Dropped(EngineError),
}

impl DeliveryOutcome {
    /// Whether some channel accepted the message.
    pub fn is_delivered(&self) -> bool {
        !matches!(self, DeliveryOutcome::Dropped(_))
    }
}

enum Plan {
    Done(DeliveryOutcome),
    Immediate(WireMap),
}

/// Routes outbound messages onto the transport's channels.
pub struct DeliveryRouter<T: Transport> {
    transport: Arc<T>,
    state: watch::Receiver<ConnectionState>,
    immediate_timeout: Duration,
}

impl<T: Transport> Clone for DeliveryRouter<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            state: self.state.clone(),
            immediate_timeout: self.immediate_timeout,
        }
    }
}

impl<T: Transport> DeliveryRouter<T> {
    /// Create a router reading connection state from `state`.
    pub fn new(
        transport: Arc<T>,
        state: watch::Receiver<ConnectionState>,
        config: &RouterConfig,
    ) -> Self {
        Self {
            transport,
            state,
            immediate_timeout: config.immediate_timeout(),
        }
    }

    /// Fire-and-forget send.
    ///
    /// Encoding and channel selection happen before this returns, and so do
    /// Persistent Context and Guaranteed Queue calls, which keeps each
    /// channel in call order. An Immediate attempt runs on a spawned task, so
    /// this must be called from within a Tokio runtime.
    pub fn send(&self, message: &Message) {
        if let Plan::Immediate(map) = self.dispatch(message) {
            let router = self.clone();
            let kind = message.kind();
            tokio::spawn(async move {
                router.send_immediate(kind, map).await;
            });
        }
    }

    /// Send and wait for the transport's answer.
    pub async fn deliver(&self, message: &Message) -> DeliveryOutcome {
        match self.dispatch(message) {
            Plan::Done(outcome) => outcome,
            Plan::Immediate(map) => self.send_immediate(message.kind(), map).await,
        }
    }

    fn dispatch(&self, message: &Message) -> Plan {
        let kind = message.kind();
        let map = match encode(message) {
            Ok(map) => map,
            Err(e) => {
                tracing::error!(kind = %kind, "Dropping message that cannot be encoded: {}", e);
                return Plan::Done(DeliveryOutcome::Dropped(EngineError::EncodingFailure(e)));
            }
        };

        let state = *self.state.borrow();
        let route = select_route(kind, &state, self.transport.complication_enabled());
        tracing::debug!(kind = %kind, channel = %route.channel(), "Routing message");

        match route {
            Route::Immediate => Plan::Immediate(map),
            Route::PersistentContext => Plan::Done(self.write_context(kind, map)),
            Route::Guaranteed(lane) => Plan::Done(self.enqueue(kind, map, lane)),
        }
    }

    async fn send_immediate(&self, kind: MessageKind, map: WireMap) -> DeliveryOutcome {
        let attempt = self.transport.send_immediate(map.clone());
        let result = match tokio::time::timeout(self.immediate_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        };

        match result {
            Ok(()) => DeliveryOutcome::Sent(Channel::Immediate),
            Err(e) => {
                let reason = EngineError::from_transport(Channel::Immediate, e);
                tracing::warn!(
                    kind = %kind,
                    "Immediate send failed ({}), falling back to persistent context",
                    reason
                );
                match self.write_context(kind, map) {
                    DeliveryOutcome::Sent(_) => DeliveryOutcome::FellBack { reason },
                    dropped => dropped,
                }
            }
        }
    }

    fn write_context(&self, kind: MessageKind, map: WireMap) -> DeliveryOutcome {
        match self.transport.set_persistent_context(map) {
            Ok(()) => DeliveryOutcome::Sent(Channel::PersistentContext),
            Err(e) => {
                let err = EngineError::from_transport(Channel::PersistentContext, e);
                tracing::warn!(kind = %kind, "Persistent context write failed: {}", err);
                DeliveryOutcome::Dropped(err)
            }
        }
    }

    fn enqueue(&self, kind: MessageKind, map: WireMap, lane: QueueLane) -> DeliveryOutcome {
        let channel = Channel::GuaranteedQueue(lane);
        match self.transport.enqueue_guaranteed(map, lane) {
            Ok(()) => DeliveryOutcome::Sent(channel),
            Err(e) => {
                let err = EngineError::from_transport(channel, e);
                tracing::warn!(kind = %kind, "Guaranteed enqueue failed: {}", err);
                DeliveryOutcome::Dropped(err)
            }
        }
    }
}

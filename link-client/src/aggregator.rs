//! Sample aggregator.
//!
//! One task owns the [`SampleBuffer`] and serializes every mutation: sensor
//! changes, the periodic tick, explicit flushes and shutdown all arrive as
//! commands or timer ticks on the same loop, so they never race.
//!
//! Triggers:
//! - a monitored source reports a new value: append a snapshot of the latest
//!   value of every source
//! - the buffer reaches `max_batch_size`: flush at once
//! - every tick: flush; an idle tick first appends one heartbeat snapshot
//! - stop: flush, then drop the sensor subscriptions
//!
//! A flush hands each sample to the router as its own `BiometricUpdate`,
//! which goes to the Guaranteed Queue.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use wristlink_core::SampleBuffer;
use wristlink_types::{BiometricUpdate, Message};

use crate::config::AggregatorConfig;
use crate::router::DeliveryRouter;
use crate::sensors::{Readings, SensorSource, SensorValue};
use crate::transport::Transport;

const COMMAND_CAPACITY: usize = 64;

/// Counters reported by [`SampleAggregator::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    /// Samples currently buffered.
    pub buffered: usize,
    /// Samples handed to the router so far.
    pub samples_submitted: u64,
    /// Non-empty flushes so far.
    pub flushes: u64,
}

enum Command {
    Reading(SensorValue),
    Flush,
    Stats(oneshot::Sender<AggregatorStats>),
    Stop(oneshot::Sender<AggregatorStats>),
}

/// Handle to a running aggregator.
///
/// Dropping the handle without [`stop`](Self::stop) aborts the aggregator:
/// buffered samples are discarded and the sensor subscriptions released.
pub struct SampleAggregator {
    commands: mpsc::Sender<Command>,
    worker: Option<JoinHandle<()>>,
    forwarders: Vec<JoinHandle<()>>,
}

impl SampleAggregator {
    /// Start aggregating the given sources.
    ///
    /// Subscriptions are taken before this returns, so no change made after
    /// it is missed.
    pub fn start<T: Transport>(
        router: DeliveryRouter<T>,
        sources: Vec<Arc<dyn SensorSource>>,
        config: &AggregatorConfig,
    ) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_CAPACITY);

        let mut readings = Readings::default();
        for source in &sources {
            readings.apply(source.current());
        }

        let forwarders = sources
            .into_iter()
            .map(|source| {
                let changes = source.subscribe();
                tokio::spawn(forward(source, changes, commands.clone()))
            })
            .collect();

        let worker = Worker {
            router,
            buffer: SampleBuffer::new(config.max_batch_size),
            readings,
            samples_submitted: 0,
            flushes: 0,
        };
        // interval_at panics on a zero period.
        let tick = config.tick_interval().max(Duration::from_millis(1));
        tracing::info!(
            "Sample aggregator started (batch: {}, tick: {:?})",
            worker.buffer.max_batch_size(),
            tick
        );
        let worker = tokio::spawn(worker.run(rx, tick));

        Self {
            commands,
            worker: Some(worker),
            forwarders,
        }
    }

    /// Feed a reading directly, as if a source had pushed it.
    pub async fn record(&self, value: SensorValue) {
        if self.commands.send(Command::Reading(value)).await.is_err() {
            tracing::warn!("Sample aggregator is not running; reading dropped");
        }
    }

    /// Flush whatever is buffered now.
    pub async fn flush(&self) {
        if self.commands.send(Command::Flush).await.is_err() {
            tracing::warn!("Sample aggregator is not running; flush skipped");
        }
    }

    /// Current counters, or `None` if the aggregator task is gone.
    pub async fn stats(&self) -> Option<AggregatorStats> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::Stats(reply)).await.ok()?;
        rx.await.ok()
    }

    /// Flush the buffer, then release every sensor subscription.
    ///
    /// Returns the final counters.
    pub async fn stop(mut self) -> AggregatorStats {
        let (reply, rx) = oneshot::channel();
        let stats = match self.commands.send(Command::Stop(reply)).await {
            Ok(()) => rx.await.unwrap_or_default(),
            Err(_) => AggregatorStats::default(),
        };

        for forwarder in std::mem::take(&mut self.forwarders) {
            forwarder.abort();
            let _ = forwarder.await;
        }
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                tracing::error!("Sample aggregator task failed: {}", e);
            }
        }

        tracing::info!(
            "Sample aggregator stopped ({} samples in {} flushes)",
            stats.samples_submitted,
            stats.flushes
        );
        stats
    }
}

impl Drop for SampleAggregator {
    fn drop(&mut self) {
        // Forwarders hold command senders, so the worker never sees the
        // channel close on its own.
        let running = self.worker.as_ref().map_or(false, |w| !w.is_finished());
        for forwarder in self.forwarders.drain(..) {
            forwarder.abort();
        }
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
        if running {
            tracing::warn!("Sample aggregator dropped without stop; buffered samples discarded");
        }
    }
}

async fn forward(
    source: Arc<dyn SensorSource>,
    mut changes: broadcast::Receiver<SensorValue>,
    commands: mpsc::Sender<Command>,
) {
    loop {
        let value = match changes.recv().await {
            Ok(value) => value,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(
                    "Sensor {} lagged by {} readings; resyncing",
                    source.name(),
                    skipped
                );
                source.current()
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        if commands.send(Command::Reading(value)).await.is_err() {
            break;
        }
    }
}

struct Worker<T: Transport> {
    router: DeliveryRouter<T>,
    buffer: SampleBuffer,
    readings: Readings,
    samples_submitted: u64,
    flushes: u64,
}

impl<T: Transport> Worker<T> {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, tick: Duration) {
        let mut timer = interval_at(Instant::now() + tick, tick);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::Reading(value)) => self.on_reading(value),
                    Some(Command::Flush) => self.flush(),
                    Some(Command::Stats(reply)) => {
                        let _ = reply.send(self.stats());
                    }
                    Some(Command::Stop(reply)) => {
                        self.flush();
                        let _ = reply.send(self.stats());
                        break;
                    }
                    None => {
                        self.flush();
                        break;
                    }
                },
                _ = timer.tick() => self.on_tick(),
            }
        }
    }

    fn on_reading(&mut self, value: SensorValue) {
        if self.readings.apply(value) {
            self.append();
        } else {
            tracing::trace!("Unchanged sensor reading ignored");
        }
    }

    fn on_tick(&mut self) {
        if self.buffer.is_empty() {
            self.append();
        }
        self.flush();
    }

    fn append(&mut self) {
        let sample = self.readings.snapshot(now_ms());
        if let Some(batch) = self.buffer.push(sample) {
            tracing::debug!("Sample buffer full, flushing {} samples", batch.len());
            self.submit(batch);
        }
    }

    fn flush(&mut self) {
        let batch = self.buffer.drain();
        if !batch.is_empty() {
            self.submit(batch);
        }
    }

    fn submit(&mut self, batch: Vec<BiometricUpdate>) {
        self.flushes += 1;
        for sample in batch {
            self.samples_submitted += 1;
            self.router.send(&Message::Biometric(sample));
        }
    }

    fn stats(&self) -> AggregatorStats {
        AggregatorStats {
            buffered: self.buffer.len(),
            samples_submitted: self.samples_submitted,
            flushes: self.flushes,
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::sensors::ManualSensor;
    use crate::transport::MockTransport;
    use tokio::sync::watch;
    use tokio::time::sleep;
    use wristlink_core::{Activation, ConnectionState, QueueLane};
    use wristlink_types::decode;

    struct Harness {
        transport: MockTransport,
        heart_rate: Arc<ManualSensor>,
        aggregator: SampleAggregator,
        _state: watch::Sender<ConnectionState>,
    }

    fn harness(max_batch_size: usize, tick_interval_secs: u64) -> Harness {
        let transport = MockTransport::new();
        let (state, rx) = watch::channel(ConnectionState {
            activation: Activation::Activated,
            reachable: true,
            paired: true,
        });
        let router = DeliveryRouter::new(
            Arc::new(transport.clone()),
            rx,
            &RouterConfig::default(),
        );
        let heart_rate = Arc::new(ManualSensor::heart_rate());
        let config = AggregatorConfig {
            max_batch_size,
            tick_interval_secs,
        };
        let aggregator = SampleAggregator::start(
            router,
            vec![heart_rate.clone() as Arc<dyn SensorSource>],
            &config,
        );
        Harness {
            transport,
            heart_rate,
            aggregator,
            _state: state,
        }
    }

    /// Push `count` distinct heart-rate readings, 50 ms apart.
    async fn beat(sensor: &ManualSensor, count: usize) {
        for i in 0..count {
            sensor.set(SensorValue::HeartRate(Some(60.0 + i as f64)));
            sleep(Duration::from_millis(50)).await;
        }
    }

    fn heart_rates(transport: &MockTransport) -> Vec<Option<f64>> {
        transport
            .guaranteed()
            .iter()
            .map(|(lane, map)| {
                assert_eq!(*lane, QueueLane::Standard);
                match decode(map).unwrap() {
                    Message::Biometric(sample) => sample.heart_rate_bpm,
                    other => panic!("unexpected message {:?}", other),
                }
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_partial_batch() {
        let h = harness(20, 5);

        beat(&h.heart_rate, 7).await;
        assert_eq!(h.transport.guaranteed_count(), 0);

        let stats = h.aggregator.stop().await;

        assert_eq!(h.transport.guaranteed_count(), 7);
        assert_eq!(stats.buffered, 0);
        assert_eq!(stats.samples_submitted, 7);
        assert_eq!(stats.flushes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn overflow_then_shutdown_delivers_everything() {
        let h = harness(20, 5);

        beat(&h.heart_rate, 25).await;

        assert_eq!(h.transport.guaranteed_count(), 20);
        let stats = h.aggregator.stats().await.unwrap();
        assert_eq!(stats.buffered, 5);

        let stats = h.aggregator.stop().await;
        assert_eq!(h.transport.guaranteed_count(), 25);
        assert_eq!(stats.buffered, 0);
        assert_eq!(stats.flushes, 2);

        let expected: Vec<Option<f64>> = (0..25).map(|i| Some(60.0 + i as f64)).collect();
        assert_eq!(heart_rates(&h.transport), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn overflow_then_tick_delivers_everything() {
        let h = harness(20, 5);

        beat(&h.heart_rate, 25).await;
        assert_eq!(h.transport.guaranteed_count(), 20);

        // First tick at 5 s flushes the remaining five without a heartbeat.
        sleep(Duration::from_millis(3800)).await;

        assert_eq!(h.transport.guaranteed_count(), 25);
        let stats = h.aggregator.stats().await.unwrap();
        assert_eq!(stats.buffered, 0);
        assert_eq!(stats.flushes, 2);

        h.aggregator.stop().await;
        assert_eq!(h.transport.guaranteed_count(), 25);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_ticks_send_heartbeat_samples() {
        let h = harness(20, 5);
        h.heart_rate.set(SensorValue::HeartRate(Some(55.0)));
        sleep(Duration::from_millis(10)).await;
        h.aggregator.flush().await;
        sleep(Duration::from_millis(10)).await;
        assert_eq!(h.transport.guaranteed_count(), 1);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(h.transport.guaranteed_count(), 2);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(h.transport.guaranteed_count(), 3);

        // Heartbeats carry the latest known values.
        assert!(heart_rates(&h.transport)
            .iter()
            .all(|bpm| *bpm == Some(55.0)));
        h.aggregator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_readings_do_not_append() {
        let h = harness(20, 60);

        h.heart_rate.set(SensorValue::HeartRate(Some(70.0)));
        h.heart_rate.set(SensorValue::HeartRate(Some(70.0)));
        h.aggregator.record(SensorValue::HeartRate(Some(70.0))).await;
        sleep(Duration::from_millis(10)).await;

        let stats = h.aggregator.stats().await.unwrap();
        assert_eq!(stats.buffered, 1);
        h.aggregator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_combines_every_source() {
        let transport = MockTransport::new();
        let (_state, rx) = watch::channel(ConnectionState::new());
        let router = DeliveryRouter::new(
            Arc::new(transport.clone()),
            rx,
            &RouterConfig::default(),
        );
        let heart_rate = Arc::new(ManualSensor::heart_rate());
        let motion = Arc::new(ManualSensor::new("motion", SensorValue::Stationary(true)));
        let aggregator = SampleAggregator::start(
            router,
            vec![
                heart_rate.clone() as Arc<dyn SensorSource>,
                motion.clone() as Arc<dyn SensorSource>,
            ],
            &AggregatorConfig::default(),
        );

        heart_rate.set(SensorValue::HeartRate(Some(91.0)));
        sleep(Duration::from_millis(10)).await;
        aggregator.stop().await;

        let sample = match decode(&transport.guaranteed()[0].1).unwrap() {
            Message::Biometric(sample) => sample,
            other => panic!("unexpected message {:?}", other),
        };
        assert_eq!(sample.heart_rate_bpm, Some(91.0));
        assert!(sample.is_stationary);
    }

    #[tokio::test(start_paused = true)]
    async fn workout_change_appends_sample() {
        let transport = MockTransport::new();
        let (_state, rx) = watch::channel(ConnectionState::new());
        let router = DeliveryRouter::new(
            Arc::new(transport.clone()),
            rx,
            &RouterConfig::default(),
        );
        let workout = Arc::new(ManualSensor::workout());
        let aggregator = SampleAggregator::start(
            router,
            vec![workout.clone() as Arc<dyn SensorSource>],
            &AggregatorConfig::default(),
        );

        workout.set(SensorValue::Workout {
            active: true,
            kind: Some("cycling".into()),
        });
        sleep(Duration::from_millis(10)).await;
        assert_eq!(aggregator.stats().await.unwrap().buffered, 1);
        aggregator.stop().await;

        let sample = match decode(&transport.guaranteed()[0].1).unwrap() {
            Message::Biometric(sample) => sample,
            other => panic!("unexpected message {:?}", other),
        };
        assert!(sample.is_in_workout);
        assert_eq!(sample.workout_type.as_deref(), Some("cycling"));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_releases_subscriptions() {
        let h = harness(20, 5);
        assert_eq!(h.heart_rate.subscriber_count(), 1);

        h.aggregator.stop().await;

        assert_eq!(h.heart_rate.subscriber_count(), 0);
        // Nothing buffered, nothing sent.
        assert_eq!(h.transport.guaranteed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_ends_aggregation() {
        let h = harness(20, 5);
        h.heart_rate.set(SensorValue::HeartRate(Some(72.0)));
        sleep(Duration::from_millis(10)).await;

        drop(h.aggregator);
        sleep(Duration::from_secs(60)).await;

        assert_eq!(h.transport.guaranteed_count(), 0);
        assert_eq!(h.heart_rate.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_of_one_flushes_every_sample() {
        let h = harness(1, 60);

        beat(&h.heart_rate, 3).await;

        assert_eq!(h.transport.guaranteed_count(), 3);
        let stats = h.aggregator.stop().await;
        assert_eq!(stats.flushes, 3);
    }
}

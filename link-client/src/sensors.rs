//! Sensor sources feeding the sample aggregator.
//!
//! A source offers its current reading on demand and pushes changes on a
//! broadcast channel. Platform sensor SDKs sit behind [`SensorSource`];
//! [`ManualSensor`] is a settable source for tests and the simulator.

use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;
use wristlink_types::BiometricUpdate;

const CHANGE_CAPACITY: usize = 32;

/// One reading from one sensor.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorValue {
    /// Heart rate in bpm, `None` while no reading is available.
    HeartRate(Option<f64>),
    /// Heart rate variability in ms, `None` while unavailable.
    Hrv(Option<f64>),
    /// Whether the wearer is stationary.
    Stationary(bool),
    /// Workout session status.
    Workout {
        /// A workout is running.
        active: bool,
        /// Activity name, if known.
        kind: Option<String>,
    },
}

/// A monitored sensor.
pub trait SensorSource: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Latest reading.
    fn current(&self) -> SensorValue;

    /// Subscribe to change notifications.
    fn subscribe(&self) -> broadcast::Receiver<SensorValue>;
}

/// Latest known value of every monitored sensor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Readings {
    heart_rate_bpm: Option<f64>,
    hrv_ms: Option<f64>,
    is_stationary: bool,
    is_in_workout: bool,
    workout_type: Option<String>,
}

impl Readings {
    /// Record a reading. Returns `false` if it matches what was known.
    pub fn apply(&mut self, value: SensorValue) -> bool {
        let before = self.clone();
        match value {
            SensorValue::HeartRate(bpm) => self.heart_rate_bpm = bpm,
            SensorValue::Hrv(ms) => self.hrv_ms = ms,
            SensorValue::Stationary(stationary) => self.is_stationary = stationary,
            SensorValue::Workout { active, kind } => {
                self.is_in_workout = active;
                self.workout_type = if active { kind } else { None };
            }
        }
        *self != before
    }

    /// Combine the latest values into one sample.
    pub fn snapshot(&self, captured_at_ms: u64) -> BiometricUpdate {
        BiometricUpdate {
            heart_rate_bpm: self.heart_rate_bpm,
            hrv_ms: self.hrv_ms,
            is_stationary: self.is_stationary,
            is_in_workout: self.is_in_workout,
            workout_type: self.workout_type.clone(),
            captured_at_ms,
        }
    }
}

/// A sensor whose value is set by hand.
#[derive(Debug)]
pub struct ManualSensor {
    name: String,
    current: Mutex<SensorValue>,
    changes: broadcast::Sender<SensorValue>,
}

impl ManualSensor {
    /// Create a sensor with an initial reading.
    pub fn new(name: &str, initial: SensorValue) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            name: name.to_string(),
            current: Mutex::new(initial),
            changes,
        }
    }

    /// Heart rate sensor with no reading yet.
    pub fn heart_rate() -> Self {
        Self::new("heart-rate", SensorValue::HeartRate(None))
    }

    /// HRV sensor with no reading yet.
    pub fn hrv() -> Self {
        Self::new("hrv", SensorValue::Hrv(None))
    }

    /// Motion sensor, initially not stationary.
    pub fn motion() -> Self {
        Self::new("motion", SensorValue::Stationary(false))
    }

    /// Workout status, initially idle.
    pub fn workout() -> Self {
        Self::new(
            "workout",
            SensorValue::Workout {
                active: false,
                kind: None,
            },
        )
    }

    /// Update the reading and notify subscribers.
    pub fn set(&self, value: SensorValue) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = value.clone();
        // No subscribers is fine.
        let _ = self.changes.send(value);
    }

    /// Number of live change subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.changes.receiver_count()
    }
}

impl SensorSource for ManualSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn current(&self) -> SensorValue {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<SensorValue> {
        self.changes.subscribe()
    }
}

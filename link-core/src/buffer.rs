//! Sample buffer for wristlink.
//!
//! This module provides the bounded batch of biometric snapshots that the
//! sample aggregator accumulates between flushes:
//! - Insertion order is preserved
//! - The buffer never rests at `max_batch_size`: the push that reaches the
//!   bound drains it and hands the batch back
//! - Draining is all-or-nothing
//!
//! Submitting the drained samples for delivery is the caller's job.

use wristlink_types::BiometricUpdate;

/// Bounded, ordered batch of snapshots.
#[derive(Debug)]
pub struct SampleBuffer {
    /// Flush threshold.
    max_batch_size: usize,
    /// Samples waiting for the next flush.
    samples: Vec<BiometricUpdate>,
}

impl SampleBuffer {
    /// Create a new buffer with the given batch bound.
    ///
    /// A bound of zero is treated as one (flush on every push).
    pub fn new(max_batch_size: usize) -> Self {
        let max_batch_size = max_batch_size.max(1);
        Self {
            max_batch_size,
            samples: Vec::with_capacity(max_batch_size),
        }
    }

    /// Append a sample.
    ///
    /// Returns the full batch, leaving the buffer empty, when this push
    /// reaches `max_batch_size`.
    pub fn push(&mut self, sample: BiometricUpdate) -> Option<Vec<BiometricUpdate>> {
        self.samples.push(sample);
        if self.samples.len() >= self.max_batch_size {
            Some(self.drain())
        } else {
            None
        }
    }

    /// Remove and return every buffered sample in insertion order.
    pub fn drain(&mut self) -> Vec<BiometricUpdate> {
        std::mem::replace(&mut self.samples, Vec::with_capacity(self.max_batch_size))
    }

    /// Most recently buffered sample.
    pub fn last(&self) -> Option<&BiometricUpdate> {
        self.samples.last()
    }

    /// Number of buffered samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The flush threshold.
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}

// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Gauge, counter and histogram instruments (spec §4.N).

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::collections::BTreeMap;

/// Attribute set attached to an instrument or an individual recording.
pub type Attributes = BTreeMap<String, String>;

/// A monotonically increasing counter. Internally stored as bits of an
/// `f64` so that fractional increments (e.g. fractional seconds) are
/// supported without losing the lock-free add path.
#[derive(Debug, Default)]
pub struct Counter {
    bits: AtomicU64,
}

impl Counter {
    /// Add `value` to the counter. Negative values are rejected by the
    /// caller's convention (counters are monotonic); this type trusts its
    /// callers, as only the crate's own registry constructs counters.
    pub fn add(&self, value: f64) {
        loop {
            let current_bits = self.bits.load(Ordering::Relaxed);
            let current = f64::from_bits(current_bits);
            let updated = (current + value).to_bits();
            if self
                .bits
                .compare_exchange_weak(current_bits, updated, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Current accumulated value.
    #[must_use]
    pub fn value(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// An instrument exposing only its last-written value.
#[derive(Debug, Default)]
pub struct Gauge {
    bits: AtomicU64,
}

impl Gauge {
    /// Overwrite the gauge's value.
    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// The most recently written value.
    #[must_use]
    pub fn value(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// A histogram with fixed, explicit bucket upper bounds (`+Inf` implied as
/// the final bucket).
#[derive(Debug)]
pub struct Histogram {
    bounds: Vec<f64>,
    state: Mutex<HistogramState>,
}

#[derive(Debug, Default)]
struct HistogramState {
    counts: Vec<u64>,
    sum: f64,
    count: u64,
}

impl Histogram {
    /// Construct a histogram with the given ascending bucket upper bounds.
    #[must_use]
    pub fn new(bounds: Vec<f64>) -> Self {
        let len = bounds.len() + 1;
        Self { bounds, state: Mutex::new(HistogramState { counts: vec![0; len], sum: 0.0, count: 0 }) }
    }

    /// Record an observation.
    pub fn observe(&self, value: f64) {
        let bucket = self.bounds.iter().position(|&bound| value <= bound).unwrap_or(self.bounds.len());
        let mut state = self.state.lock();
        state.counts[bucket] += 1;
        state.sum += value;
        state.count += 1;
    }

    /// Snapshot `(bucket_upper_bounds_with_inf, cumulative_counts, sum, count)`.
    #[must_use]
    pub fn snapshot(&self) -> HistogramSnapshot {
        let state = self.state.lock();
        HistogramSnapshot { bucket_counts: state.counts.clone(), sum: state.sum, count: state.count }
    }
}

/// Point-in-time view of a [`Histogram`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct HistogramSnapshot {
    /// Per-bucket observation counts, in bound order with the final entry
    /// covering `(last_bound, +Inf]`.
    pub bucket_counts: Vec<u64>,
    /// Sum of all observed values.
    pub sum: f64,
    /// Total number of observations.
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates() {
        let counter = Counter::default();
        counter.add(1.0);
        counter.add(2.5);
        assert_eq!(counter.value(), 3.5);
    }

    #[test]
    fn gauge_reflects_last_write() {
        let gauge = Gauge::default();
        gauge.set(5.0);
        gauge.set(2.0);
        assert_eq!(gauge.value(), 2.0);
    }

    #[test]
    fn histogram_buckets_observations() {
        let hist = Histogram::new(vec![1.0, 5.0, 10.0]);
        hist.observe(0.5);
        hist.observe(3.0);
        hist.observe(7.0);
        hist.observe(100.0);
        let snap = hist.snapshot();
        assert_eq!(snap.bucket_counts, vec![1, 1, 1, 1]);
        assert_eq!(snap.count, 4);
        assert_eq!(snap.sum, 110.5);
    }
}

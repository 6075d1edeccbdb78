// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Oscillation Detector (spec §4.B): sliding-window sign-change analysis
//! driving a circuit breaker over the controller's output.

use std::collections::VecDeque;

use parking_lot::RwLock;

/// A single recorded sample.
#[derive(Debug, Clone, Copy)]
struct Sample {
    output: f64,
    #[allow(dead_code)] // retained for parity with spec §4.B's ring shape; not yet read back
    measurement: f64,
    timestamp: f64,
}

/// Tunable detector configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    /// Number of trailing samples considered.
    pub window_size: usize,
    /// Fraction of sign changes (of window_size-1 comparisons) required to
    /// declare oscillation.
    pub threshold_pct: f64,
    /// Samples with `|output| <= min_magnitude` are ignored when counting
    /// sign changes.
    pub min_magnitude: f64,
    /// Minimum wall-clock span the window must cover before tripping.
    pub min_duration_seconds: f64,
    /// Seconds after tripping before the breaker auto-resets.
    pub reset_duration_seconds: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            threshold_pct: 0.6,
            min_magnitude: 0.0,
            min_duration_seconds: 0.0,
            reset_duration_seconds: 30.0,
        }
    }
}

#[derive(Debug)]
struct Inner {
    config: DetectorConfig,
    samples: VecDeque<Sample>,
    tripped: bool,
    tripped_since: Option<f64>,
    override_until: Option<f64>,
}

/// Thread-safe oscillation detector / circuit breaker.
#[derive(Debug)]
pub struct OscillationDetector {
    inner: RwLock<Inner>,
}

/// Point-in-time circuit-breaker status (spec §4.C `GetCircuitBreakerStatus`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitBreakerStatus {
    /// Whether the breaker is currently tripped (after accounting for
    /// auto-reset and any active override).
    pub tripped: bool,
    /// Whether a temporary override is currently bypassing detection.
    pub overridden: bool,
}

impl OscillationDetector {
    /// Construct a detector with the given configuration.
    #[must_use]
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            inner: RwLock::new(Inner {
                config,
                samples: VecDeque::with_capacity(config.window_size),
                tripped: false,
                tripped_since: None,
                override_until: None,
            }),
        }
    }

    /// Replace the detector configuration (spec §4.C `ConfigureCircuitBreaker`).
    pub fn configure(&self, config: DetectorConfig) {
        let mut inner = self.inner.write();
        inner.config = config;
    }

    /// Record a new `(output, measurement)` sample at time `now` and
    /// re-evaluate whether the breaker should trip.
    pub fn add_sample(&self, output: f64, measurement: f64, now: f64) {
        let mut inner = self.inner.write();
        let window_size = inner.config.window_size;
        inner.samples.push_back(Sample { output, measurement, timestamp: now });
        while inner.samples.len() > window_size {
            let _ = inner.samples.pop_front();
        }
        let min_magnitude = inner.config.min_magnitude;
        let threshold_pct = inner.config.threshold_pct;
        let min_duration = inner.config.min_duration_seconds;

        let significant: Vec<f64> =
            inner.samples.iter().map(|s| s.output).filter(|v| v.abs() > min_magnitude).collect();

        let mut sign_changes = 0usize;
        for pair in significant.windows(2) {
            if (pair[0] > 0.0) != (pair[1] > 0.0) {
                sign_changes += 1;
            }
        }
        let comparisons = significant.len().saturating_sub(1).max(1);
        let fraction = sign_changes as f64 / comparisons as f64;

        let span = match (inner.samples.front(), inner.samples.back()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        };

        if fraction >= threshold_pct && span >= min_duration && sign_changes > 0 {
            inner.tripped = true;
            if inner.tripped_since.is_none() {
                inner.tripped_since = Some(now);
            }
        }
    }

    /// Whether the breaker is effectively tripped at time `now`, applying
    /// auto-reset and any active override.
    pub fn is_tripped(&self, now: f64) -> bool {
        if self.overridden(now) {
            return false;
        }
        let mut inner = self.inner.write();
        if inner.tripped {
            if let Some(since) = inner.tripped_since {
                if now - since >= inner.config.reset_duration_seconds {
                    inner.tripped = false;
                    inner.tripped_since = None;
                }
            }
        }
        inner.tripped
    }

    fn overridden(&self, now: f64) -> bool {
        self.inner.read().override_until.is_some_and(|until| now < until)
    }

    /// Explicitly clear the tripped state (spec §4.C `ResetCircuitBreaker`).
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.tripped = false;
        inner.tripped_since = None;
        inner.samples.clear();
    }

    /// Grant a time-bounded bypass during which [`OscillationDetector::is_tripped`]
    /// always returns `false` (spec §4.C `TemporaryOverrideCircuitBreaker`).
    pub fn override_bypass(&self, now: f64, duration_seconds: f64) {
        let mut inner = self.inner.write();
        inner.override_until = Some(now + duration_seconds);
    }

    /// Current status snapshot.
    pub fn status(&self, now: f64) -> CircuitBreakerStatus {
        CircuitBreakerStatus { tripped: self.is_tripped(now), overridden: self.overridden(now) }
    }
}

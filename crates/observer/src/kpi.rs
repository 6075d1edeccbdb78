// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Per-pipeline KPI retention: the last observed cardinality estimate
//! survives a failed scrape (spec §4.L, §7 "ScrapeUnavailable ... Observer
//! emits the previous value").

use std::fmt;

/// Which of the three parallel pipelines a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineLabel {
    /// The unsampled, full-fidelity pipeline.
    FullFidelity,
    /// The actively-retuned pipeline the control loop targets.
    Optimised,
    /// The experimental pipeline, gated by `pipelines.experimental_enabled`.
    Experimental,
}

impl PipelineLabel {
    /// All three labels, in the fixed order used for scrape fan-out and
    /// artifact field ordering.
    pub const ALL: [PipelineLabel; 3] = [PipelineLabel::FullFidelity, PipelineLabel::Optimised, PipelineLabel::Experimental];

    /// The `phoenix_pipeline_label` value used on the scrape contract
    /// (spec §6).
    #[must_use]
    pub fn as_label_value(self) -> &'static str {
        match self {
            PipelineLabel::FullFidelity => "full_fidelity",
            PipelineLabel::Optimised => "optimised",
            PipelineLabel::Experimental => "experimental",
        }
    }

    /// The pipeline namespace segment of the scraped metric name, e.g.
    /// `full` in `full_phoenix_pipeline_output_cardinality_estimate`.
    #[must_use]
    pub fn namespace(self) -> &'static str {
        match self {
            PipelineLabel::FullFidelity => "full",
            PipelineLabel::Optimised => "optimized",
            PipelineLabel::Experimental => "experimental",
        }
    }
}

impl fmt::Display for PipelineLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label_value())
    }
}

/// A point-in-time view of all three pipelines' cardinality estimates,
/// as consumed by the Profile Selector and rendered into the control-signal
/// artifact's `current_metrics`.
#[derive(Debug, Clone, Copy, Default)]
pub struct KpiSnapshot {
    /// Full-fidelity pipeline's estimated active time-series count.
    pub full_ts: u64,
    /// Optimised pipeline's estimated active time-series count — the
    /// signal the control loop regulates.
    pub optimized_ts: u64,
    /// Experimental pipeline's estimated active time-series count.
    pub experimental_ts: u64,
}

impl KpiSnapshot {
    /// Ratio of time-series eliminated by running the optimised pipeline
    /// in place of full fidelity, clamped into `[0, 1]` (spec §3
    /// `cost_reduction_ratio`).
    #[must_use]
    pub fn cost_reduction_ratio(&self) -> f64 {
        if self.full_ts == 0 {
            return 0.0;
        }
        let raw = 1.0 - (self.optimized_ts as f64 / self.full_ts as f64);
        raw.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Retained {
    value: u64,
    consecutive_failures: u32,
}

impl Default for Retained {
    fn default() -> Self {
        Self { value: 0, consecutive_failures: 0 }
    }
}

/// How many consecutive scrape failures before a pipeline is marked
/// "degraded" in self-metrics (spec §7).
pub const DEGRADED_AFTER_FAILURES: u32 = 3;

/// Holds the last-observed value per pipeline, retained across scrape
/// ticks so a transient failure never zeroes a KPI the selector depends
/// on.
#[derive(Debug, Default)]
pub struct KpiStore {
    full_fidelity: Retained,
    optimised: Retained,
    experimental: Retained,
}

impl KpiStore {
    /// Construct an empty store; all pipelines start at `0` until the
    /// first successful scrape.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_mut(&mut self, pipeline: PipelineLabel) -> &mut Retained {
        match pipeline {
            PipelineLabel::FullFidelity => &mut self.full_fidelity,
            PipelineLabel::Optimised => &mut self.optimised,
            PipelineLabel::Experimental => &mut self.experimental,
        }
    }

    fn slot(&self, pipeline: PipelineLabel) -> &Retained {
        match pipeline {
            PipelineLabel::FullFidelity => &self.full_fidelity,
            PipelineLabel::Optimised => &self.optimised,
            PipelineLabel::Experimental => &self.experimental,
        }
    }

    /// Record a successful scrape, clearing the failure streak.
    pub fn record_success(&mut self, pipeline: PipelineLabel, value: u64) {
        let slot = self.slot_mut(pipeline);
        slot.value = value;
        slot.consecutive_failures = 0;
    }

    /// Record a failed scrape; the retained value is left untouched.
    /// Returns `true` once the failure streak reaches
    /// [`DEGRADED_AFTER_FAILURES`].
    pub fn record_failure(&mut self, pipeline: PipelineLabel) -> bool {
        let slot = self.slot_mut(pipeline);
        slot.consecutive_failures = slot.consecutive_failures.saturating_add(1);
        slot.consecutive_failures == DEGRADED_AFTER_FAILURES
    }

    /// The currently retained value for `pipeline`.
    #[must_use]
    pub fn value(&self, pipeline: PipelineLabel) -> u64 {
        self.slot(pipeline).value
    }

    /// `true` once `pipeline` has hit or exceeded the degraded threshold.
    #[must_use]
    pub fn is_degraded(&self, pipeline: PipelineLabel) -> bool {
        self.slot(pipeline).consecutive_failures >= DEGRADED_AFTER_FAILURES
    }

    /// A consistent snapshot of all three retained values.
    #[must_use]
    pub fn snapshot(&self) -> KpiSnapshot {
        KpiSnapshot { full_ts: self.full_fidelity.value, optimized_ts: self.optimised.value, experimental_ts: self.experimental.value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_retains_last_observed_value() {
        let mut store = KpiStore::new();
        store.record_success(PipelineLabel::Optimised, 10_000);
        store.record_failure(PipelineLabel::Optimised);
        assert_eq!(store.value(PipelineLabel::Optimised), 10_000);
    }

    #[test]
    fn third_consecutive_failure_marks_degraded() {
        let mut store = KpiStore::new();
        assert!(!store.record_failure(PipelineLabel::Experimental));
        assert!(!store.record_failure(PipelineLabel::Experimental));
        assert!(store.record_failure(PipelineLabel::Experimental));
        assert!(store.is_degraded(PipelineLabel::Experimental));
    }

    #[test]
    fn success_clears_the_failure_streak() {
        let mut store = KpiStore::new();
        store.record_failure(PipelineLabel::FullFidelity);
        store.record_failure(PipelineLabel::FullFidelity);
        store.record_success(PipelineLabel::FullFidelity, 50_000);
        assert!(!store.is_degraded(PipelineLabel::FullFidelity));
        assert_eq!(store.value(PipelineLabel::FullFidelity), 50_000);
    }

    #[test]
    fn cost_reduction_ratio_is_clamped() {
        let snap = KpiSnapshot { full_ts: 50_000, optimized_ts: 10_000, experimental_ts: 0 };
        assert!((snap.cost_reduction_ratio() - 0.8).abs() < 1e-9);

        let zero_full = KpiSnapshot { full_ts: 0, optimized_ts: 10_000, experimental_ts: 0 };
        assert_eq!(zero_full.cost_reduction_ratio(), 0.0);
    }
}

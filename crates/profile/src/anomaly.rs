// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Anomaly Hook (spec §4.M): force-switches the profile to aggressive on
//! a high-confidence cardinality anomaly, bypassing the stability hold.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::selector::{Profile, ProfileSelector, SelectionResult};

/// Severity of an incoming anomaly report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySeverity {
    /// Highest severity; force-switches eligible.
    Critical,
    /// Elevated severity; force-switches eligible.
    High,
    /// Recorded but never forces a switch.
    Medium,
    /// Recorded but never forces a switch.
    Low,
}

impl AnomalySeverity {
    fn force_eligible(self) -> bool {
        matches!(self, AnomalySeverity::Critical | AnomalySeverity::High)
    }
}

/// An anomaly report as received over the HTTP surface (spec §4.M, §6
/// `POST /anomaly`).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AnomalyReport {
    /// Unique identifier for this report.
    pub anomaly_id: String,
    /// Reported severity.
    pub severity: AnomalySeverity,
    /// Name of the metric the anomaly was detected on.
    pub metric_name: String,
    /// The value that triggered the anomaly.
    pub current_value: f64,
    /// The value the detector expected.
    pub expected_value: f64,
    /// Detector confidence, `[0, 1]`.
    pub confidence: f64,
    /// Unix-seconds timestamp of the detection.
    pub timestamp: u64,
}

/// Outcome of handling one [`AnomalyReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnomalyOutcome {
    /// Whether this report forced an immediate profile switch.
    pub forced_switch: bool,
}

/// Counters of anomaly reports processed, split by whether they forced a
/// switch.
#[derive(Debug, Default)]
pub struct AnomalyCounters {
    acknowledged: AtomicU64,
    forced: AtomicU64,
}

impl AnomalyCounters {
    /// Total reports received (forced or not).
    pub fn acknowledged(&self) -> u64 {
        self.acknowledged.load(Ordering::Relaxed)
    }

    /// Reports that forced an immediate profile switch.
    pub fn forced(&self) -> u64 {
        self.forced.load(Ordering::Relaxed)
    }
}

/// Receives anomaly reports and force-switches the attached
/// [`ProfileSelector`] to [`Profile::Aggressive`] when policy demands it
/// (spec §4.M): `severity ∈ {critical, high}` AND the metric corresponds
/// to optimised-pipeline cardinality AND `current_value > aggressiveMin`.
/// All other reports are acknowledged and counted but never mutate state.
pub struct AnomalyHook {
    selector: Arc<ProfileSelector>,
    optimized_pipeline_metric_name: String,
    counters: AnomalyCounters,
}

impl AnomalyHook {
    /// Construct a hook watching `optimized_pipeline_metric_name` and
    /// force-switching `selector` on matching high-severity anomalies.
    #[must_use]
    pub fn new(selector: Arc<ProfileSelector>, optimized_pipeline_metric_name: impl Into<String>) -> Self {
        Self { selector, optimized_pipeline_metric_name: optimized_pipeline_metric_name.into(), counters: AnomalyCounters::default() }
    }

    /// Process one report, forcing a switch when policy demands it.
    pub fn handle(&self, report: &AnomalyReport, now: u64) -> AnomalyOutcome {
        self.counters.acknowledged.fetch_add(1, Ordering::Relaxed);

        let matches_policy = report.severity.force_eligible()
            && report.metric_name == self.optimized_pipeline_metric_name
            && report.current_value > self.selector.thresholds().aggressive_min;

        if !matches_policy {
            return AnomalyOutcome { forced_switch: false };
        }

        let SelectionResult { .. } = self.selector.force_profile(Profile::Aggressive, now, "anomaly_detected");
        self.counters.forced.fetch_add(1, Ordering::Relaxed);
        AnomalyOutcome { forced_switch: true }
    }

    /// Report-processing counters.
    #[must_use]
    pub fn counters(&self) -> &AnomalyCounters {
        &self.counters
    }
}

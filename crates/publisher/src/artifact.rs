// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The control-signal artifact's data shape (spec §3, §6).

use phoenix_profile::Profile;
use serde::{Deserialize, Serialize};

/// Per-pipeline cardinality snapshot carried by the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentMetrics {
    /// Full-fidelity pipeline's time-series count.
    pub full_ts: u64,
    /// Optimised pipeline's time-series count.
    pub optimized_ts: u64,
    /// Experimental pipeline's time-series count.
    pub experimental_ts: u64,
    /// Estimated cardinality reduction vs. full-fidelity, `[0, 1]`.
    pub cost_reduction_ratio: f64,
}

/// The thresholds separating profiles, echoed into the artifact for
/// consumer visibility.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArtifactThresholds {
    /// `Mc`: cardinality below which the conservative profile applies.
    pub conservative_max_ts: u64,
    /// `Ma`: cardinality above which the aggressive profile applies.
    pub aggressive_min_ts: u64,
}

/// Pipeline-activation flags carried by the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineFlags {
    /// Whether the experimental pipeline is currently active.
    pub experimental_enabled: bool,
}

/// Everything a [`crate::Publisher::publish`] call needs to know about the
/// current control state; the publisher itself owns `config_version`,
/// `correlation_id` and the profile-change timestamp.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    /// The profile to publish.
    pub profile: Profile,
    /// Human-readable justification, surfaced as `trigger_reason`.
    pub trigger_reason: String,
    /// Current per-pipeline cardinality snapshot.
    pub current_metrics: CurrentMetrics,
    /// Echoed threshold configuration.
    pub thresholds: ArtifactThresholds,
    /// Pipeline-activation flags.
    pub pipelines: PipelineFlags,
    /// Whether this call represents an actual profile transition; gates
    /// whether `last_profile_change_timestamp` advances (spec §3
    /// invariant).
    pub profile_changed: bool,
}

/// The fully rendered artifact (spec §6), as published to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Active optimisation profile.
    pub optimization_profile: Profile,
    /// Strictly increasing version counter.
    pub config_version: u64,
    /// `<prefix>-<unix>-v<version>` correlation id for this publication.
    pub correlation_id: String,
    /// RFC3339 UTC timestamp of this publication.
    pub last_updated: String,
    /// Human-readable trigger justification.
    pub trigger_reason: String,
    /// Per-pipeline cardinality snapshot.
    pub current_metrics: CurrentMetrics,
    /// Echoed threshold configuration.
    pub thresholds: ArtifactThresholds,
    /// Pipeline-activation flags.
    pub pipelines: PipelineFlags,
    /// RFC3339 UTC timestamp of the last actual profile transition.
    pub last_profile_change_timestamp: String,
}

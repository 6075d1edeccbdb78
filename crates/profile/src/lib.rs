// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Profile Selector and Anomaly Hook (spec §4.J, §4.M): decides the
//! active optimisation profile from observed cardinality, with hysteresis,
//! a stability hold, and a force-override path for high-confidence
//! anomalies.

pub mod anomaly;
pub mod error;
pub mod selector;

pub use anomaly::{AnomalyCounters, AnomalyHook, AnomalyOutcome, AnomalyReport, AnomalySeverity};
pub use error::Error;
pub use selector::{Profile, ProfileSelector, SelectionResult, Thresholds};

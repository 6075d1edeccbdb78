// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The adaptive control loop's regulator: PID kernel, oscillation detector
//! and the controller assembly that wraps them (spec §4.A-C).

pub mod controller;
pub mod error;
pub mod oscillation;
pub mod pid;

pub use controller::ControllerAssembly;
pub use error::Error;
pub use oscillation::{CircuitBreakerStatus, DetectorConfig, OscillationDetector};
pub use pid::{Pid, PidState, PidTunings};

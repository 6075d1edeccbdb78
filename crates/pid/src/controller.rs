// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Controller Assembly (spec §4.C): wraps the PID kernel and the
//! oscillation detector, exposing tunings, limits and metrics hooks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use phoenix_telemetry::MetricsRegistry;

use crate::error::Error;
use crate::oscillation::{CircuitBreakerStatus, DetectorConfig, OscillationDetector};
use crate::pid::{DegradeRestore, Pid, PidState, PidTunings};

/// A named PID controller with an attached oscillation-based circuit
/// breaker. When the breaker trips, the assembly degrades to P-only
/// control with `Kp` scaled by `0.1`, integral reset, and halved output
/// limits — graceful damping rather than a zero-output deadband (spec
/// §4.B).
pub struct ControllerAssembly {
    name: String,
    pid: Mutex<Pid>,
    degraded: Mutex<Option<DegradeRestore>>,
    detector: OscillationDetector,
    circuit_breaker_enabled: AtomicBool,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl ControllerAssembly {
    /// Construct a new controller assembly.
    pub fn new(
        name: impl Into<String>,
        kp: f64,
        ki: f64,
        kd: f64,
        setpoint: f64,
        output_min: f64,
        output_max: f64,
        detector_config: DetectorConfig,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> Result<Self, Error> {
        Ok(Self {
            name: name.into(),
            pid: Mutex::new(Pid::new(kp, ki, kd, setpoint, output_min, output_max)?),
            degraded: Mutex::new(None),
            detector: OscillationDetector::new(detector_config),
            circuit_breaker_enabled: AtomicBool::new(true),
            metrics,
        })
    }

    /// Drive the controller forward one tick, applying circuit-breaker
    /// degradation transparently. Never fails (spec §4.N).
    pub fn compute(&self, measurement: f64, now: f64) -> f64 {
        let breaker_active = self.circuit_breaker_enabled.load(Ordering::Relaxed) && self.detector.is_tripped(now);

        let output = {
            let mut pid = self.pid.lock();
            let mut degraded = self.degraded.lock();
            match (breaker_active, degraded.is_some()) {
                (true, false) => *degraded = Some(pid.degrade_for_oscillation()),
                (false, true) => {
                    if let Some(saved) = degraded.take() {
                        pid.restore(saved);
                    }
                }
                _ => {}
            }
            pid.compute(measurement, now)
        };

        self.detector.add_sample(output, measurement, now);

        if let Some(metrics) = &self.metrics {
            let attrs = [("controller", self.name.as_str())];
            metrics.gauge("phoenix_pid_output", &attrs).set(output);
            metrics.gauge("phoenix_pid_measurement", &attrs).set(measurement);
            metrics.counter("phoenix_pid_compute_count", &attrs).add(1.0);
            let state = self.pid.lock().state();
            metrics.gauge("phoenix_pid_integral", &attrs).set(state.integral);
            metrics.gauge("phoenix_pid_last_error", &attrs).set(state.last_error);
        }

        output
    }

    /// spec §4.C `SetSetpoint`.
    pub fn set_setpoint(&self, setpoint: f64) {
        self.pid.lock().set_setpoint(setpoint);
    }

    /// spec §4.C `SetTunings`.
    pub fn set_tunings(&self, kp: f64, ki: f64, kd: f64) -> Result<(), Error> {
        self.pid.lock().set_tunings(kp, ki, kd)
    }

    /// spec §4.C `SetOutputLimits`.
    pub fn set_output_limits(&self, min: f64, max: f64) -> Result<(), Error> {
        self.pid.lock().set_output_limits(min, max)
    }

    /// spec §4.C `SetIntegralLimit`.
    pub fn set_integral_limit(&self, limit: f64) -> Result<(), Error> {
        self.pid.lock().set_integral_limit(limit)
    }

    /// spec §4.C `SetDerivativeFilterCoefficient`.
    pub fn set_derivative_filter_coefficient(&self, alpha: f64) {
        self.pid.lock().set_derivative_filter_coefficient(alpha);
    }

    /// spec §4.C `SetAntiWindupEnabled`.
    pub fn set_anti_windup_enabled(&self, enabled: bool) {
        self.pid.lock().set_anti_windup_enabled(enabled);
    }

    /// spec §4.C `SetAntiWindupGain`.
    pub fn set_anti_windup_gain(&self, gain: f64) {
        self.pid.lock().set_anti_windup_gain(gain);
    }

    /// spec §4.C `EnableCircuitBreaker`.
    pub fn enable_circuit_breaker(&self, enabled: bool) {
        self.circuit_breaker_enabled.store(enabled, Ordering::Relaxed);
    }

    /// spec §4.C `ConfigureCircuitBreaker`.
    pub fn configure_circuit_breaker(&self, config: DetectorConfig) {
        self.detector.configure(config);
    }

    /// spec §4.C `ResetIntegral`.
    pub fn reset_integral(&self) {
        self.pid.lock().reset_integral();
    }

    /// spec §4.C `ResetCircuitBreaker`.
    pub fn reset_circuit_breaker(&self) {
        self.detector.reset();
        if let Some(saved) = self.degraded.lock().take() {
            self.pid.lock().restore(saved);
        }
    }

    /// spec §4.C `TemporaryOverrideCircuitBreaker`.
    pub fn temporary_override_circuit_breaker(&self, now: f64, duration_seconds: f64) {
        self.detector.override_bypass(now, duration_seconds);
    }

    /// spec §4.C `GetState`.
    #[must_use]
    pub fn get_state(&self) -> PidState {
        self.pid.lock().state()
    }

    /// Current gains and integral clamp, for self-reporting surfaces
    /// (admin `/metrics`) that need live tunings rather than boot config.
    #[must_use]
    pub fn get_tunings(&self) -> PidTunings {
        self.pid.lock().tunings()
    }

    /// spec §4.C `GetCircuitBreakerStatus`.
    #[must_use]
    pub fn get_circuit_breaker_status(&self, now: f64) -> CircuitBreakerStatus {
        self.detector.status(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembly() -> ControllerAssembly {
        ControllerAssembly::new(
            "test",
            1.0,
            0.1,
            0.0,
            100.0,
            -1000.0,
            1000.0,
            DetectorConfig { window_size: 6, threshold_pct: 0.5, min_magnitude: 0.0, min_duration_seconds: 0.0, reset_duration_seconds: 30.0 },
            None,
        )
        .expect("valid construction")
    }

    #[test]
    fn degrades_output_when_circuit_breaker_trips() {
        let assembly = assembly();
        // Drive wild oscillation by alternating far above/below setpoint.
        for i in 0..8 {
            let measurement = if i % 2 == 0 { 0.0 } else { 200.0 };
            let _ = assembly.compute(measurement, i as f64 * 0.01);
        }
        assert!(assembly.get_circuit_breaker_status(0.1).tripped);
        let degraded_output = assembly.compute(0.0, 0.09);
        assert!(degraded_output.abs() <= 1000.0);
    }

    #[test]
    fn reset_circuit_breaker_restores_normal_gains() {
        let assembly = assembly();
        for i in 0..8 {
            let measurement = if i % 2 == 0 { 0.0 } else { 200.0 };
            let _ = assembly.compute(measurement, i as f64 * 0.01);
        }
        assembly.reset_circuit_breaker();
        assert!(!assembly.get_circuit_breaker_status(0.2).tripped);
    }

    #[test]
    fn get_tunings_reflects_construction_gains() {
        let assembly = assembly();
        let tunings = assembly.get_tunings();
        assert_eq!(tunings.kp, 1.0);
        assert_eq!(tunings.ki, 0.1);
    }

    #[test]
    fn get_state_reflects_last_compute() {
        let assembly = assembly();
        let _ = assembly.compute(90.0, 1.0);
        let state = assembly.get_state();
        assert!((state.last_error - 10.0).abs() < 1e-9);
        assert!((state.setpoint - 100.0).abs() < 1e-9);
    }
}

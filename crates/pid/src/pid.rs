// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! PID Kernel (spec §4.A): bounded control output from error, with
//! anti-windup back-calculation and a filtered derivative term.

use crate::error::Error;

/// `dt` values at or below this are considered noise and the previous `dt`
/// is reused instead.
const DT_THRESHOLD_SECONDS: f64 = 0.001;

/// A single PID controller's state. Every mutation happens inside
/// [`Pid::compute`] or one of the setters below; callers needing
/// thread-safety wrap this in a mutex (the controller assembly does so).
#[derive(Debug, Clone)]
pub struct Pid {
    kp: f64,
    ki: f64,
    kd: f64,
    setpoint: f64,
    integral: f64,
    integral_limit: f64,
    last_error: f64,
    error_before_last: Option<f64>,
    last_time: Option<f64>,
    last_dt: f64,
    output_min: f64,
    output_max: f64,
    anti_windup_enabled: bool,
    anti_windup_gain: f64,
    derivative_filter_coefficient: f64,
    hysteresis_pct: f64,
}

/// A snapshot of the controller's observable state (spec §4.C `GetState`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidState {
    /// The error computed on the most recent `compute` call.
    pub last_error: f64,
    /// The current (post-clamp) integral accumulator.
    pub integral: f64,
    /// The active setpoint.
    pub setpoint: f64,
}

/// A snapshot of the controller's current gains and integral clamp, for
/// surfaces (e.g. the admin `/metrics` endpoint) that report live tunings
/// rather than the values a process booted with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidTunings {
    /// Proportional gain.
    pub kp: f64,
    /// Integral gain.
    pub ki: f64,
    /// Derivative gain.
    pub kd: f64,
    /// Symmetric clamp applied to the integral accumulator.
    pub integral_limit: f64,
}

impl Pid {
    /// Construct a new controller. Fails if any gain is negative or if
    /// `output_min >= output_max`.
    pub fn new(kp: f64, ki: f64, kd: f64, setpoint: f64, output_min: f64, output_max: f64) -> Result<Self, Error> {
        if kp < 0.0 || ki < 0.0 || kd < 0.0 {
            return Err(Error::invalid_parameter("gains must be non-negative"));
        }
        if output_min >= output_max {
            return Err(Error::invalid_parameter("output_min must be < output_max"));
        }
        Ok(Self {
            kp,
            ki,
            kd,
            setpoint,
            integral: 0.0,
            integral_limit: f64::MAX,
            last_error: 0.0,
            error_before_last: None,
            last_time: None,
            last_dt: 1.0,
            output_min,
            output_max,
            anti_windup_enabled: true,
            anti_windup_gain: 1.0,
            derivative_filter_coefficient: 1.0,
            hysteresis_pct: 0.0,
        })
    }

    /// Replace the setpoint.
    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
    }

    /// Atomically replace the three gains. Fails if any is negative.
    pub fn set_tunings(&mut self, kp: f64, ki: f64, kd: f64) -> Result<(), Error> {
        if kp < 0.0 || ki < 0.0 || kd < 0.0 {
            return Err(Error::invalid_parameter("gains must be non-negative"));
        }
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
        Ok(())
    }

    /// Replace the output clamp. Fails if `min >= max`.
    pub fn set_output_limits(&mut self, min: f64, max: f64) -> Result<(), Error> {
        if min >= max {
            return Err(Error::invalid_parameter("output_min must be < output_max"));
        }
        self.output_min = min;
        self.output_max = max;
        Ok(())
    }

    /// Replace the integral clamp, re-clamping the current accumulator.
    pub fn set_integral_limit(&mut self, limit: f64) -> Result<(), Error> {
        if limit < 0.0 {
            return Err(Error::invalid_parameter("integral_limit must be non-negative"));
        }
        self.integral_limit = limit;
        self.integral = self.integral.clamp(-limit, limit);
        Ok(())
    }

    /// Replace the derivative IIR coefficient, clamped to `[0, 1]`.
    pub fn set_derivative_filter_coefficient(&mut self, alpha: f64) {
        self.derivative_filter_coefficient = alpha.clamp(0.0, 1.0);
    }

    /// Enable or disable back-calculation anti-windup.
    pub fn set_anti_windup_enabled(&mut self, enabled: bool) {
        self.anti_windup_enabled = enabled;
    }

    /// Set the anti-windup back-calculation gain.
    pub fn set_anti_windup_gain(&mut self, gain: f64) {
        self.anti_windup_gain = gain;
    }

    /// Set the hysteresis deadband, as a fraction of `|setpoint|`.
    pub fn set_hysteresis_pct(&mut self, pct: f64) {
        self.hysteresis_pct = pct.max(0.0);
    }

    /// Zero the integral accumulator (spec §4.C `ResetIntegral`).
    pub fn reset_integral(&mut self) {
        self.integral = 0.0;
    }

    /// Current observable state.
    #[must_use]
    pub fn state(&self) -> PidState {
        PidState { last_error: self.last_error, integral: self.integral, setpoint: self.setpoint }
    }

    /// Current gains and integral clamp, reflecting any `SetTunings`/
    /// `SetIntegralLimit` calls since construction.
    #[must_use]
    pub fn tunings(&self) -> PidTunings {
        PidTunings { kp: self.kp, ki: self.ki, kd: self.kd, integral_limit: self.integral_limit }
    }

    /// Temporarily scale `Kp` and halve the output limits, used by the
    /// controller assembly when the oscillation detector trips (spec
    /// §4.B). Returns the values needed to restore normal operation.
    pub fn degrade_for_oscillation(&mut self) -> DegradeRestore {
        let restore = DegradeRestore {
            kp: self.kp,
            ki: self.ki,
            kd: self.kd,
            output_min: self.output_min,
            output_max: self.output_max,
        };
        self.kp *= 0.1;
        self.ki = 0.0;
        self.kd = 0.0;
        self.integral = 0.0;
        self.output_min /= 2.0;
        self.output_max /= 2.0;
        restore
    }

    /// Restore gains and limits saved by [`Pid::degrade_for_oscillation`].
    pub fn restore(&mut self, saved: DegradeRestore) {
        self.kp = saved.kp;
        self.ki = saved.ki;
        self.kd = saved.kd;
        self.output_min = saved.output_min;
        self.output_max = saved.output_max;
    }

    /// Compute a new bounded control output for `measurement` at time
    /// `now` (seconds, monotonic within a single controller's lifetime).
    ///
    /// Never fails: construction-time validation is the only place domain
    /// errors can occur (spec §4.N "PID compute never throws").
    pub fn compute(&mut self, measurement: f64, now: f64) -> f64 {
        let error = self.setpoint - measurement;

        let mut dt = match self.last_time {
            Some(last_time) => now - last_time,
            None => self.last_dt,
        };
        if dt <= DT_THRESHOLD_SECONDS {
            dt = self.last_dt;
        }

        let effective_error =
            if error.abs() < self.setpoint.abs() * self.hysteresis_pct { 0.0 } else { error };

        let proportional = self.kp * effective_error;

        let mut integral = self.integral + (effective_error + self.last_error) / 2.0 * dt;
        integral = integral.clamp(-self.integral_limit, self.integral_limit);

        let d_raw = if dt > 0.0 { (effective_error - self.last_error) / dt } else { 0.0 };
        let d_prev = match self.error_before_last {
            Some(error_before_last) if self.last_dt > 0.0 => {
                (self.last_error - error_before_last) / self.last_dt
            }
            _ => 0.0,
        };
        let filtered_derivative =
            self.derivative_filter_coefficient * d_raw + (1.0 - self.derivative_filter_coefficient) * d_prev;
        let derivative = self.kd * filtered_derivative;

        let raw_output = proportional + self.ki * integral + derivative;
        let limited_output = raw_output.clamp(self.output_min, self.output_max);

        if (limited_output - raw_output).abs() > f64::EPSILON && self.anti_windup_enabled && self.ki != 0.0 {
            integral += self.anti_windup_gain * (limited_output - raw_output) / self.ki;
            integral = integral.clamp(-self.integral_limit, self.integral_limit);
        }

        self.error_before_last = Some(self.last_error);
        self.last_error = effective_error;
        self.integral = integral;
        self.last_dt = dt;
        self.last_time = Some(now);

        limited_output
    }
}

/// Gains and limits saved before [`Pid::degrade_for_oscillation`], to be
/// restored once the oscillation detector resets.
#[derive(Debug, Clone, Copy)]
pub struct DegradeRestore {
    kp: f64,
    ki: f64,
    kd: f64,
    output_min: f64,
    output_max: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_gains() {
        assert!(Pid::new(-1.0, 0.0, 0.0, 0.0, -1.0, 1.0).is_err());
    }

    #[test]
    fn rejects_inverted_output_limits() {
        assert!(Pid::new(1.0, 0.0, 0.0, 0.0, 1.0, 1.0).is_err());
        assert!(Pid::new(1.0, 0.0, 0.0, 0.0, 2.0, 1.0).is_err());
    }

    #[test]
    fn step_response_grows_monotonically_and_stays_unsaturated() {
        let mut pid = Pid::new(1.0, 0.1, 0.0, 100.0, -1000.0, 1000.0).expect("valid params");
        let mut previous = f64::MIN;
        for step in 1..=10 {
            let output = pid.compute(90.0, step as f64);
            assert!(output > previous, "output should strictly increase under constant positive error");
            assert!(output < 1000.0, "output should not saturate within 10 steps");
            previous = output;
        }
    }

    #[test]
    fn zero_ki_has_no_integral_contribution() {
        let mut pid = Pid::new(1.0, 0.0, 0.0, 100.0, -1000.0, 1000.0).expect("valid params");
        for step in 1..=5 {
            let output = pid.compute(90.0, step as f64);
            assert!((output - 10.0).abs() < 1e-9, "with Ki=0 output should equal Kp*error exactly");
        }
    }

    #[test]
    fn integral_never_exceeds_limit() {
        let mut pid = Pid::new(0.0, 10.0, 0.0, 100.0, -1_000_000.0, 1_000_000.0).expect("valid params");
        pid.set_integral_limit(50.0).expect("valid limit");
        for step in 1..=100 {
            let _ = pid.compute(0.0, step as f64);
            let state = pid.state();
            assert!(state.integral.abs() <= 50.0 + 1e-9);
        }
    }

    #[test]
    fn output_always_within_limits() {
        let mut pid = Pid::new(5.0, 5.0, 5.0, 100.0, -10.0, 10.0).expect("valid params");
        for step in 1..=50 {
            let output = pid.compute(0.0, step as f64);
            assert!((-10.0..=10.0).contains(&output));
        }
    }

    #[test]
    fn hysteresis_suppresses_small_errors() {
        let mut pid = Pid::new(1.0, 0.0, 0.0, 100.0, -1000.0, 1000.0).expect("valid params");
        pid.set_hysteresis_pct(0.1); // 10% of setpoint == 10
        let output = pid.compute(95.0, 1.0); // error=5, below threshold
        assert!((output - 0.0).abs() < 1e-9);
    }

    #[test]
    fn tunings_reflect_set_tunings_and_integral_limit() {
        let mut pid = Pid::new(1.0, 0.1, 0.0, 100.0, -1000.0, 1000.0).expect("valid params");
        pid.set_tunings(2.0, 0.2, 0.3).expect("valid gains");
        pid.set_integral_limit(50.0).expect("valid limit");
        let tunings = pid.tunings();
        assert_eq!(tunings, PidTunings { kp: 2.0, ki: 0.2, kd: 0.3, integral_limit: 50.0 });
    }

    #[test]
    fn degrade_then_restore_round_trips_gains() {
        let mut pid = Pid::new(2.0, 0.5, 0.3, 100.0, -100.0, 100.0).expect("valid params");
        let saved = pid.degrade_for_oscillation();
        assert!((pid.kp - 0.2).abs() < 1e-9);
        assert_eq!(pid.ki, 0.0);
        pid.restore(saved);
        assert!((pid.kp - 2.0).abs() < 1e-9);
        assert!((pid.ki - 0.5).abs() < 1e-9);
        assert!((pid.output_max - 100.0).abs() < 1e-9);
    }
}

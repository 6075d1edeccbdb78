// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Environment-driven settings (spec §6). Every variable is optional; the
//! defaults shown in spec.md are reproduced here verbatim.

use std::env::VarError;
use thiserror::Error;

/// Errors parsing an environment variable into its typed settings field.
#[derive(Debug, Error)]
pub enum Error {
    /// The variable was present but failed to parse as the expected type.
    #[error("environment variable {name}={value:?} is not a valid {expected}")]
    InvalidValue {
        /// Name of the environment variable.
        name: &'static str,
        /// The raw value that failed to parse.
        value: String,
        /// The expected type, for the error message.
        expected: &'static str,
    },
}

/// Top-level runtime configuration, sourced from the environment (spec §6).
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Base URL of the Prometheus instance backing the scrape fallback.
    pub prometheus_url: String,
    /// Path of the control-signal artifact the publisher writes.
    pub control_signal_file: String,
    /// Path of the YAML template the publisher renders from.
    pub opt_mode_template_path: String,
    /// Operator set-point for the optimised pipeline's time-series count.
    pub target_optimized_pipeline_ts_count: u64,
    /// Conservative-profile upper cardinality threshold (`Mc`).
    pub threshold_optimization_conservative_max_ts: u64,
    /// Aggressive-profile lower cardinality threshold (`Ma`).
    pub threshold_optimization_aggressive_min_ts: u64,
    /// Hysteresis factor `h` expanding the exit boundary around the active
    /// profile.
    pub hysteresis_factor: f64,
    /// Minimum seconds between profile transitions absent an anomaly
    /// override.
    pub adaptive_controller_stability_seconds: u64,
    /// Tick interval, in seconds, for the adaptive control loop.
    pub adaptive_controller_interval_seconds: u64,
    /// PID proportional gain.
    pub pid_kp: f64,
    /// PID integral gain.
    pub pid_ki: f64,
    /// PID derivative gain.
    pub pid_kd: f64,
    /// Symmetric clamp applied to the PID integral accumulator.
    pub pid_integral_limit: f64,
    /// Prefix used when synthesising `correlation_id` values.
    pub correlation_id_prefix: String,
    /// Bind address for the admin HTTP server exposing `/health`,
    /// `/metrics`, `/mode` and `/anomaly`.
    pub admin_bind_address: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            prometheus_url: "http://prometheus:9090".to_string(),
            control_signal_file: "/app/control_signals/optimization_mode.yaml".to_string(),
            opt_mode_template_path: "/app/optimization_mode_template.yaml".to_string(),
            target_optimized_pipeline_ts_count: 20_000,
            threshold_optimization_conservative_max_ts: 15_000,
            threshold_optimization_aggressive_min_ts: 25_000,
            hysteresis_factor: 0.1,
            adaptive_controller_stability_seconds: 120,
            adaptive_controller_interval_seconds: 60,
            pid_kp: 0.5,
            pid_ki: 0.1,
            pid_kd: 0.05,
            pid_integral_limit: 10_000.0,
            correlation_id_prefix: "pv3ux".to_string(),
            admin_bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the process environment, falling back to
    /// spec-mandated defaults for anything unset.
    pub fn from_env() -> Result<Self, Error> {
        let mut settings = Self::default();
        parse_string(&mut settings.prometheus_url, "PROMETHEUS_URL")?;
        parse_string(&mut settings.control_signal_file, "CONTROL_SIGNAL_FILE")?;
        parse_string(&mut settings.opt_mode_template_path, "OPT_MODE_TEMPLATE_PATH")?;
        parse_string(&mut settings.correlation_id_prefix, "CORRELATION_ID_PREFIX")?;
        parse_string(&mut settings.admin_bind_address, "ADMIN_BIND_ADDRESS")?;

        parse_numeric(&mut settings.target_optimized_pipeline_ts_count, "TARGET_OPTIMIZED_PIPELINE_TS_COUNT")?;
        parse_numeric(
            &mut settings.threshold_optimization_conservative_max_ts,
            "THRESHOLD_OPTIMIZATION_CONSERVATIVE_MAX_TS",
        )?;
        parse_numeric(
            &mut settings.threshold_optimization_aggressive_min_ts,
            "THRESHOLD_OPTIMIZATION_AGGRESSIVE_MIN_TS",
        )?;
        parse_numeric(&mut settings.adaptive_controller_stability_seconds, "ADAPTIVE_CONTROLLER_STABILITY_SECONDS")?;
        parse_numeric(&mut settings.adaptive_controller_interval_seconds, "ADAPTIVE_CONTROLLER_INTERVAL_SECONDS")?;

        parse_numeric(&mut settings.hysteresis_factor, "HYSTERESIS_FACTOR")?;
        parse_numeric(&mut settings.pid_kp, "PID_KP")?;
        parse_numeric(&mut settings.pid_ki, "PID_KI")?;
        parse_numeric(&mut settings.pid_kd, "PID_KD")?;
        parse_numeric(&mut settings.pid_integral_limit, "PID_INTEGRAL_LIMIT")?;

        Ok(settings)
    }
}

fn parse_string(field: &mut String, name: &'static str) -> Result<(), Error> {
    match std::env::var(name) {
        Ok(value) => {
            *field = value;
            Ok(())
        }
        Err(VarError::NotPresent) => Ok(()),
        Err(VarError::NotUnicode(_)) => {
            Err(Error::InvalidValue { name, value: "<non-utf8>".to_string(), expected: "UTF-8 string" })
        }
    }
}

trait EnvNumeric: Sized {
    const TYPE_NAME: &'static str;
    fn parse_env(s: &str) -> Option<Self>;
}

impl EnvNumeric for u64 {
    const TYPE_NAME: &'static str = "u64";
    fn parse_env(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

impl EnvNumeric for f64 {
    const TYPE_NAME: &'static str = "f64";
    fn parse_env(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

fn parse_numeric<T: EnvNumeric>(field: &mut T, name: &'static str) -> Result<(), Error> {
    match std::env::var(name) {
        Ok(value) => match T::parse_env(&value) {
            Some(parsed) => {
                *field = parsed;
                Ok(())
            }
            None => Err(Error::InvalidValue { name, value, expected: T::TYPE_NAME }),
        },
        Err(VarError::NotPresent) => Ok(()),
        Err(VarError::NotUnicode(_)) => {
            Err(Error::InvalidValue { name, value: "<non-utf8>".to_string(), expected: T::TYPE_NAME })
        }
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_match_spec() {
        let _guard = ENV_LOCK.lock().expect("lock");
        // SAFETY: serialized by ENV_LOCK; no other test in this process
        // mutates PID_KP concurrently.
        unsafe {
            std::env::remove_var("PID_KP");
        }
        let settings = Settings::from_env().expect("defaults parse");
        assert_eq!(settings.pid_kp, 0.5);
        assert_eq!(settings.target_optimized_pipeline_ts_count, 20_000);
        assert_eq!(settings.correlation_id_prefix, "pv3ux");
        assert_eq!(settings.admin_bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn overrides_apply_and_parse() {
        let _guard = ENV_LOCK.lock().expect("lock");
        // SAFETY: serialized by ENV_LOCK for the duration of this test.
        unsafe {
            std::env::set_var("PID_KP", "1.25");
            std::env::set_var("TARGET_OPTIMIZED_PIPELINE_TS_COUNT", "30000");
        }
        let settings = Settings::from_env().expect("parses overrides");
        assert_eq!(settings.pid_kp, 1.25);
        assert_eq!(settings.target_optimized_pipeline_ts_count, 30_000);
        // SAFETY: serialized by ENV_LOCK.
        unsafe {
            std::env::remove_var("PID_KP");
            std::env::remove_var("TARGET_OPTIMIZED_PIPELINE_TS_COUNT");
        }
    }

    #[test]
    fn invalid_numeric_value_is_rejected() {
        let _guard = ENV_LOCK.lock().expect("lock");
        // SAFETY: serialized by ENV_LOCK.
        unsafe {
            std::env::set_var("PID_KI", "not-a-number");
        }
        let result = Settings::from_env();
        // SAFETY: serialized by ENV_LOCK.
        unsafe {
            std::env::remove_var("PID_KI");
        }
        assert!(result.is_err());
    }
}

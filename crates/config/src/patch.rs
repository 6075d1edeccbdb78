// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The `ConfigPatch` / `ConfigStatus` data model (spec §3).

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lexical form of a dotted `parameter_path`: one or more
/// `[A-Za-z_][A-Za-z0-9_]*` segments joined by `.`.
static PARAMETER_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("parameter path pattern is a fixed, valid regex")
});

/// Returns `true` if `path` matches the dotted `parameter_path` grammar.
#[must_use]
pub fn is_valid_parameter_path(path: &str) -> bool {
    PARAMETER_PATH_RE.is_match(path)
}

/// Polymorphic patch payload. Modelled as a tagged variant (spec §9) rather
/// than an untyped JSON value so that coercion rules are explicit at the
/// processor boundary: `Int <-> Float` is allowed only when lossless, no
/// other cross-variant coercion is permitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConfigValue {
    /// A signed integer value.
    Int(i64),
    /// A floating point value.
    Float(f64),
    /// A boolean flag.
    Bool(bool),
    /// A string value.
    String(String),
}

impl ConfigValue {
    /// Coerce `self` into an `i64`, succeeding only for `Int` or a `Float`
    /// with no fractional part that round-trips exactly.
    #[must_use]
    pub fn as_i64_lossless(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(v) => Some(*v),
            ConfigValue::Float(v) if v.fract() == 0.0 && *v >= i64::MIN as f64 && *v <= i64::MAX as f64 => {
                Some(*v as i64)
            }
            _ => None,
        }
    }

    /// Coerce `self` into an `f64`, succeeding for `Int` (always lossless
    /// within f64's 53-bit mantissa range for realistic parameter values)
    /// or `Float` directly.
    #[must_use]
    pub fn as_f64_lossless(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(v) => Some(*v),
            ConfigValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

/// Proposed severity of a [`ConfigPatch`]; `Safety` bypasses safe-mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Routine tuning adjustment.
    Normal,
    /// An elevated-priority adjustment, still subject to rate limiting.
    Urgent,
    /// A safety-critical adjustment; permitted even while the registry is
    /// in safe-mode.
    Safety,
}

/// Origin of a [`ConfigPatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Emitted automatically by the PID-backed controller assembly.
    PidDecider,
    /// Received from an external OpAMP-style management channel.
    Opamp,
    /// Submitted directly by an operator (e.g. via the HTTP surface).
    Manual,
}

/// A proposed mutation to one parameter of one processor (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConfigPatch {
    /// Unique identifier for this patch.
    pub patch_id: String,
    /// Identity of the target processor.
    pub target: String,
    /// Dotted path of the parameter to mutate.
    pub parameter_path: String,
    /// The proposed new value.
    pub new_value: ConfigValue,
    /// The value the submitter believed was current, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_value: Option<ConfigValue>,
    /// Human-readable justification.
    pub reason: String,
    /// Priority/safety classification.
    pub severity: Severity,
    /// Where the patch originated.
    pub source: Source,
    /// Unix-seconds creation timestamp.
    pub timestamp: u64,
    /// Seconds after `timestamp` this patch remains valid; `0` means
    /// non-expiring.
    pub ttl_seconds: u64,
    /// Monotonically increasing version, compared against the target's
    /// current `ConfigStatus::version` to detect conflicts.
    pub version: u64,
}

impl ConfigPatch {
    /// Whether this patch has expired relative to `now` (unix seconds).
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        self.ttl_seconds > 0 && self.timestamp.saturating_add(self.ttl_seconds) < now
    }
}

/// A processor's self-description, reported to the registry (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConfigStatus {
    /// Current parameter values, keyed by dotted path.
    pub values: BTreeMap<String, ConfigValue>,
    /// Whether the processor is currently enabled.
    pub enabled: bool,
    /// Version of the last successfully applied patch.
    pub version: u64,
    /// Unix-seconds timestamp of the last update.
    pub timestamp: u64,
}

impl ConfigStatus {
    /// An empty, disabled, version-0 status — the state of a processor
    /// that has never received a patch.
    #[must_use]
    pub fn new_unconfigured(now: u64) -> Self {
        Self { values: BTreeMap::new(), enabled: true, version: 0, timestamp: now }
    }

    /// Look up a value by dotted path via nested traversal. Phoenix's
    /// status maps are flat (key is the full dotted path) by convention,
    /// so this is a direct lookup; nested-map traversal with
    /// intermediate-map creation is the registry's concern when applying,
    /// not the status's when reading.
    #[must_use]
    pub fn get(&self, parameter_path: &str) -> Option<&ConfigValue> {
        self.values.get(parameter_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_path_accepts_dotted_identifiers() {
        assert!(is_valid_parameter_path("topk.capacity"));
        assert!(is_valid_parameter_path("a"));
        assert!(is_valid_parameter_path("a.b.c_d"));
    }

    #[test]
    fn parameter_path_rejects_malformed_paths() {
        assert!(!is_valid_parameter_path(""));
        assert!(!is_valid_parameter_path(".a"));
        assert!(!is_valid_parameter_path("a."));
        assert!(!is_valid_parameter_path("1a"));
        assert!(!is_valid_parameter_path("a..b"));
        assert!(!is_valid_parameter_path("a b"));
    }

    #[test]
    fn lossless_coercion_rejects_fractional_float_as_int() {
        assert_eq!(ConfigValue::Float(3.0).as_i64_lossless(), Some(3));
        assert_eq!(ConfigValue::Float(3.5).as_i64_lossless(), None);
        assert_eq!(ConfigValue::Bool(true).as_i64_lossless(), None);
    }

    #[test]
    fn ttl_zero_never_expires() {
        let patch = ConfigPatch {
            patch_id: "p1".into(),
            target: "topk".into(),
            parameter_path: "capacity".into(),
            new_value: ConfigValue::Int(5),
            prev_value: None,
            reason: "test".into(),
            severity: Severity::Normal,
            source: Source::Manual,
            timestamp: 1_000,
            ttl_seconds: 0,
            version: 1,
        };
        assert!(!patch.is_expired(10_000_000));
    }

    #[test]
    fn ttl_nonzero_expires_after_deadline() {
        let patch = ConfigPatch {
            patch_id: "p1".into(),
            target: "topk".into(),
            parameter_path: "capacity".into(),
            new_value: ConfigValue::Int(5),
            prev_value: None,
            reason: "test".into(),
            severity: Severity::Normal,
            source: Source::Manual,
            timestamp: 1_000,
            ttl_seconds: 60,
            version: 1,
        };
        assert!(!patch.is_expired(1_059));
        assert!(patch.is_expired(1_061));
    }
}

// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Validator policy: rate limiting, cooldown, TTL and allow-list
//! configuration for the patch fabric (spec §4.D).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::patch::Severity;

fn default_max_patches_per_minute() -> u32 {
    60
}

fn default_patch_cooldown_seconds() -> u64 {
    5
}

fn default_history_capacity() -> usize {
    100
}

/// Policy governing what the validator accepts (spec §4.D). An empty
/// `allowed_sources` or `allowed_severities` means "allow all" — the
/// interpretation spec.md §9 calls out explicitly, not "deny all".
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ValidatorPolicy {
    /// Maximum accepted patches per rolling one-minute window. `0` rejects
    /// everything except `Severity::Safety`.
    #[serde(default = "default_max_patches_per_minute")]
    pub max_patches_per_minute: u32,

    /// Minimum seconds between successful patches to the same
    /// `(target, parameter_path)`.
    #[serde(default = "default_patch_cooldown_seconds")]
    pub patch_cooldown_seconds: u64,

    /// Non-empty restricts accepted patches to these sources.
    #[serde(default)]
    pub allowed_sources: Vec<String>,

    /// Non-empty restricts accepted patches to these severities.
    #[serde(default)]
    pub allowed_severities: Vec<Severity>,

    /// Bounded FIFO history capacity (applied patches retained for audit).
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl Default for ValidatorPolicy {
    fn default() -> Self {
        Self {
            max_patches_per_minute: default_max_patches_per_minute(),
            patch_cooldown_seconds: default_patch_cooldown_seconds(),
            allowed_sources: Vec::new(),
            allowed_severities: Vec::new(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl ValidatorPolicy {
    /// Structural validation of the policy itself, distinct from patch
    /// validation. Returns human-readable errors, following the teacher
    /// corpus's `validation_errors(path_prefix)` convention.
    #[must_use]
    pub fn validation_errors(&self, path_prefix: &str) -> Vec<String> {
        let mut errors = Vec::new();
        if self.history_capacity == 0 {
            errors.push(format!("{path_prefix}.history_capacity must be non-zero"));
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_expected_values() {
        let policy = ValidatorPolicy::default();
        assert_eq!(policy.max_patches_per_minute, 60);
        assert_eq!(policy.patch_cooldown_seconds, 5);
        assert!(policy.allowed_sources.is_empty());
        assert!(policy.allowed_severities.is_empty());
        assert_eq!(policy.history_capacity, 100);
    }

    #[test]
    fn validates_non_zero_history_capacity() {
        let mut policy = ValidatorPolicy::default();
        policy.history_capacity = 0;
        let errors = policy.validation_errors("validator");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("history_capacity"));
    }

    #[test]
    fn rejects_unknown_fields() {
        let json = r#"{"max_patches_per_minute": 10, "bogus_field": true}"#;
        let result: Result<ValidatorPolicy, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}

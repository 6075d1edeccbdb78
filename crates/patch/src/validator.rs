// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Patch Validator (spec §4.D): schema, rate, cooldown, allow-list and TTL
//! checks applied in order before a patch is allowed to reach the registry.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use phoenix_config::{ConfigPatch, Error, PatchErrorKind, Severity, ValidatorPolicy, is_valid_parameter_path};

/// Validates submitted [`ConfigPatch`]es against a [`ValidatorPolicy`] and
/// keeps the bookkeeping (rate-limit window, per-path cooldown, bounded
/// history) needed to enforce it.
pub struct Validator {
    policy: Mutex<ValidatorPolicy>,
    submission_window: Mutex<VecDeque<u64>>,
    last_accepted: Mutex<HashMap<(String, String), u64>>,
    history: Mutex<VecDeque<ConfigPatch>>,
}

const RATE_LIMIT_WINDOW_SECONDS: u64 = 60;

impl Validator {
    /// Construct a validator enforcing `policy`.
    #[must_use]
    pub fn new(policy: ValidatorPolicy) -> Self {
        Self {
            policy: Mutex::new(policy),
            submission_window: Mutex::new(VecDeque::new()),
            last_accepted: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Replace the active policy.
    pub fn set_policy(&self, policy: ValidatorPolicy) {
        *self.policy.lock() = policy;
    }

    /// Run the full validation pipeline (spec §4.D, steps 1-7). On success
    /// the patch is recorded in the bounded history and the rate-limit /
    /// cooldown bookkeeping is updated.
    pub fn validate(&self, patch: &ConfigPatch, now: u64) -> Result<(), Error> {
        if patch.patch_id.is_empty() || patch.target.is_empty() || patch.parameter_path.is_empty() {
            return Err(Error::for_patch(PatchErrorKind::InvalidPatch, patch.patch_id.clone(), "required field missing"));
        }

        if !is_valid_parameter_path(&patch.parameter_path) {
            return Err(Error::for_patch(
                PatchErrorKind::InvalidParameter,
                patch.patch_id.clone(),
                format!("parameter_path '{}' is lexically invalid", patch.parameter_path),
            ));
        }

        if patch.is_expired(now) {
            return Err(Error::for_patch(PatchErrorKind::Expired, patch.patch_id.clone(), "patch ttl elapsed"));
        }

        let policy = self.policy.lock().clone_policy();

        if !policy.allowed_sources.is_empty() {
            let source_name = source_name(patch.source);
            if !policy.allowed_sources.iter().any(|s| s == source_name) {
                return Err(Error::for_patch(
                    PatchErrorKind::InvalidPatch,
                    patch.patch_id.clone(),
                    format!("source '{source_name}' is not in the allow-list"),
                ));
            }
        }

        if !policy.allowed_severities.is_empty() && !policy.allowed_severities.contains(&patch.severity) {
            return Err(Error::for_patch(
                PatchErrorKind::InvalidPatch,
                patch.patch_id.clone(),
                "severity is not in the allow-list",
            ));
        }

        if patch.severity != Severity::Safety {
            let mut window = self.submission_window.lock();
            while let Some(&front) = window.front() {
                if front + RATE_LIMIT_WINDOW_SECONDS <= now {
                    let _ = window.pop_front();
                } else {
                    break;
                }
            }
            if window.len() as u32 >= policy.max_patches_per_minute {
                return Err(Error::for_patch(PatchErrorKind::RateLimited, patch.patch_id.clone(), "rate limit exceeded"));
            }
        }

        let key = (patch.target.clone(), patch.parameter_path.clone());
        if patch.severity != Severity::Safety {
            if let Some(&last) = self.last_accepted.lock().get(&key) {
                if now.saturating_sub(last) < policy.patch_cooldown_seconds {
                    return Err(Error::for_patch(PatchErrorKind::Cooldown, patch.patch_id.clone(), "cooldown has not elapsed"));
                }
            }
        }

        if patch.severity != Severity::Safety {
            self.submission_window.lock().push_back(now);
        }
        let _ = self.last_accepted.lock().insert(key, now);

        let mut history = self.history.lock();
        history.push_back(patch.clone());
        while history.len() > policy.history_capacity.max(1) {
            let _ = history.pop_front();
        }

        Ok(())
    }

    /// Snapshot of the accepted-patch history, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<ConfigPatch> {
        self.history.lock().iter().cloned().collect()
    }
}

fn source_name(source: phoenix_config::Source) -> &'static str {
    match source {
        phoenix_config::Source::PidDecider => "pid_decider",
        phoenix_config::Source::Opamp => "opamp",
        phoenix_config::Source::Manual => "manual",
    }
}

trait ClonePolicy {
    fn clone_policy(&self) -> ValidatorPolicy;
}

impl ClonePolicy for ValidatorPolicy {
    fn clone_policy(&self) -> ValidatorPolicy {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phoenix_config::ConfigValue;

    fn patch(id: &str, target: &str, path: &str, severity: Severity, now: u64) -> ConfigPatch {
        ConfigPatch {
            patch_id: id.to_string(),
            target: target.to_string(),
            parameter_path: path.to_string(),
            new_value: ConfigValue::Int(1),
            prev_value: None,
            reason: "test".to_string(),
            severity,
            source: phoenix_config::Source::Manual,
            timestamp: now,
            ttl_seconds: 0,
            version: 1,
        }
    }

    #[test]
    fn rejects_missing_required_fields() {
        let validator = Validator::new(ValidatorPolicy::default());
        let bad = patch("", "topk", "capacity", Severity::Normal, 100);
        let result = validator.validate(&bad, 100);
        assert_eq!(result.unwrap_err().kind, PatchErrorKind::InvalidPatch);
    }

    #[test]
    fn rejects_malformed_parameter_path() {
        let validator = Validator::new(ValidatorPolicy::default());
        let bad = patch("p1", "topk", "1bad", Severity::Normal, 100);
        assert_eq!(validator.validate(&bad, 100).unwrap_err().kind, PatchErrorKind::InvalidParameter);
    }

    #[test]
    fn expired_patch_is_rejected() {
        let validator = Validator::new(ValidatorPolicy::default());
        let mut expiring = patch("p1", "topk", "capacity", Severity::Normal, 0);
        expiring.ttl_seconds = 10;
        assert_eq!(validator.validate(&expiring, 100).unwrap_err().kind, PatchErrorKind::Expired);
    }

    #[test]
    fn max_patches_per_minute_zero_rejects_all_but_safety() {
        let validator = Validator::new(ValidatorPolicy { max_patches_per_minute: 0, ..ValidatorPolicy::default() });
        let normal = patch("p1", "topk", "capacity", Severity::Normal, 100);
        assert_eq!(validator.validate(&normal, 100).unwrap_err().kind, PatchErrorKind::RateLimited);

        let safety = patch("p2", "topk", "capacity", Severity::Safety, 100);
        assert!(validator.validate(&safety, 100).is_ok());
    }

    #[test]
    fn cooldown_rejects_resubmission_to_same_path_too_soon() {
        let validator = Validator::new(ValidatorPolicy { patch_cooldown_seconds: 30, ..ValidatorPolicy::default() });
        let first = patch("p1", "topk", "capacity", Severity::Normal, 100);
        assert!(validator.validate(&first, 100).is_ok());
        let second = patch("p2", "topk", "capacity", Severity::Normal, 110);
        assert_eq!(validator.validate(&second, 110).unwrap_err().kind, PatchErrorKind::Cooldown);
        let third = patch("p3", "topk", "capacity", Severity::Normal, 131);
        assert!(validator.validate(&third, 131).is_ok());
    }

    #[test]
    fn source_allow_list_rejects_other_sources() {
        let validator = Validator::new(ValidatorPolicy { allowed_sources: vec!["opamp".to_string()], ..ValidatorPolicy::default() });
        let manual = patch("p1", "topk", "capacity", Severity::Normal, 100);
        assert!(validator.validate(&manual, 100).is_err());
    }

    #[test]
    fn empty_allow_lists_allow_everything() {
        let validator = Validator::new(ValidatorPolicy::default());
        let manual = patch("p1", "topk", "capacity", Severity::Normal, 100);
        assert!(validator.validate(&manual, 100).is_ok());
    }

    #[test]
    fn history_is_bounded_fifo() {
        let validator = Validator::new(ValidatorPolicy { history_capacity: 2, patch_cooldown_seconds: 0, ..ValidatorPolicy::default() });
        for i in 0..5 {
            let p = patch(&format!("p{i}"), "topk", &format!("k{i}"), Severity::Normal, 100 + i as u64);
            assert!(validator.validate(&p, 100 + i as u64).is_ok());
        }
        let history = validator.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].patch_id, "p3");
        assert_eq!(history[1].patch_id, "p4");
    }
}

// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Exposes the process-context learner to the patch fabric: `enabled`,
//! `damping_factor` and `iterations` are all reconfigurable (spec §4.I).

use std::collections::BTreeMap;

use phoenix_config::{ConfigPatch, ConfigStatus, ConfigValue, Error as ConfigError, PatchErrorKind};
use phoenix_patch::ReconfigurableProcessor;

use crate::graph::ProcessContextGraph;

/// Processor name this learner registers under in the patch fabric.
pub const PROCESSOR_NAME: &str = "process_context";

impl ReconfigurableProcessor for ProcessContextGraph {
    fn name(&self) -> &str {
        PROCESSOR_NAME
    }

    fn apply(&self, patch: &ConfigPatch) -> Result<(), ConfigError> {
        match patch.parameter_path.as_str() {
            "enabled" => {
                let ConfigValue::Bool(value) = &patch.new_value else {
                    return Err(ConfigError::for_patch(PatchErrorKind::InvalidParameter, patch.patch_id.clone(), "enabled must be a bool"));
                };
                self.set_enabled(*value);
            }
            "damping_factor" => {
                let value = patch.new_value.as_f64_lossless().ok_or_else(|| {
                    ConfigError::for_patch(PatchErrorKind::InvalidParameter, patch.patch_id.clone(), "damping_factor must be numeric")
                })?;
                self.set_damping_factor(value)
                    .map_err(|e| ConfigError::for_patch(PatchErrorKind::InvalidParameter, patch.patch_id.clone(), e.to_string()))?;
            }
            "iterations" => {
                let value = patch.new_value.as_i64_lossless().ok_or_else(|| {
                    ConfigError::for_patch(PatchErrorKind::InvalidParameter, patch.patch_id.clone(), "iterations must be an integer")
                })?;
                if value <= 0 {
                    return Err(ConfigError::for_patch(PatchErrorKind::InvalidParameter, patch.patch_id.clone(), "iterations must be positive"));
                }
                self.set_iterations(value as u32)
                    .map_err(|e| ConfigError::for_patch(PatchErrorKind::InvalidParameter, patch.patch_id.clone(), e.to_string()))?;
            }
            other => {
                return Err(ConfigError::for_patch(PatchErrorKind::UnknownParameter, patch.patch_id.clone(), format!("unknown parameter '{other}'")));
            }
        }
        self.record_patch(patch.version, patch.timestamp);
        Ok(())
    }

    fn status(&self) -> ConfigStatus {
        let mut values = BTreeMap::new();
        let _ = values.insert("enabled".to_string(), ConfigValue::Bool(self.enabled()));
        let _ = values.insert("damping_factor".to_string(), ConfigValue::Float(self.damping_factor()));
        let _ = values.insert("iterations".to_string(), ConfigValue::Int(i64::from(self.iterations())));
        ConfigStatus { values, enabled: self.enabled(), version: self.version(), timestamp: self.updated_at() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phoenix_config::Source;
    use phoenix_config::Severity;

    fn patch(path: &str, value: ConfigValue) -> ConfigPatch {
        ConfigPatch {
            patch_id: "p1".to_string(),
            target: PROCESSOR_NAME.to_string(),
            parameter_path: path.to_string(),
            new_value: value,
            prev_value: None,
            reason: "test".to_string(),
            severity: Severity::Normal,
            source: Source::Manual,
            timestamp: 100,
            ttl_seconds: 0,
            version: 1,
        }
    }

    #[test]
    fn damping_factor_out_of_range_is_rejected() {
        let graph = ProcessContextGraph::new(0.85, 20).expect("valid");
        let result = graph.apply(&patch("damping_factor", ConfigValue::Float(1.5)));
        assert_eq!(result.unwrap_err().kind, PatchErrorKind::InvalidParameter);
    }

    #[test]
    fn valid_patch_updates_status() {
        let graph = ProcessContextGraph::new(0.85, 20).expect("valid");
        graph.apply(&patch("iterations", ConfigValue::Int(5))).expect("applies");
        assert_eq!(graph.status().values.get("iterations"), Some(&ConfigValue::Int(5)));
        assert_eq!(graph.status().version, 1);
    }
}

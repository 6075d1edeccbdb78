// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Cardinality Engine: composes the priority tagger, top-k sketch and
//! rollup engine into the hybrid retention strategy described in spec
//! §4.F, and exposes itself to the patch fabric as a reconfigurable
//! processor (spec §4.E).

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use phoenix_config::{ConfigStatus, ConfigValue, Error as ConfigError, PatchErrorKind};
use phoenix_patch::ReconfigurableProcessor;

use crate::model::Resource;
use crate::priority::{Priority, PriorityTagger};
use crate::rollup::RollupEngine;
use crate::topk::TopK;

/// How the retained set is computed from the tagger's and sketch's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Retain only identifiers currently in the top-k set.
    TopK,
    /// Retain identifiers in the top-k set OR tagged with a retained
    /// priority.
    Hybrid,
}

struct Tunables {
    strategy: Strategy,
    retained_priorities: HashSet<Priority>,
    version: u64,
}

/// Processor name this engine registers under in the patch fabric.
pub const PROCESSOR_NAME: &str = "cardinality";

/// The composed top-k / rollup / priority pipeline (spec §4.F's "hybrid
/// strategy"): top-k is recomputed once per input batch before the
/// retain/rollup split is applied to every member of the batch.
pub struct CardinalityEngine {
    tagger: PriorityTagger,
    topk: TopK,
    rollup: RollupEngine,
    tunables: RwLock<Tunables>,
    enabled: std::sync::atomic::AtomicBool,
    updated_at: AtomicU64,
}

/// Result of running one batch through the engine.
pub struct EngineOutput {
    /// Resources retained at full cardinality.
    pub retained: Vec<Resource>,
    /// Rolled-up resources, one per category, for everything not
    /// retained.
    pub rolled_up: Vec<Resource>,
}

impl CardinalityEngine {
    /// Construct an engine from its three component stages.
    #[must_use]
    pub fn new(tagger: PriorityTagger, topk: TopK, rollup: RollupEngine, strategy: Strategy, retained_priorities: HashSet<Priority>) -> Self {
        Self {
            tagger,
            topk,
            rollup,
            tunables: RwLock::new(Tunables { strategy, retained_priorities, version: 0 }),
            enabled: std::sync::atomic::AtomicBool::new(true),
            updated_at: AtomicU64::new(0),
        }
    }

    /// Tag, top-k-rank and split a batch of resources into retained vs.
    /// rollup candidates, then aggregate the rollup candidates.
    #[must_use]
    pub fn process_batch(&self, resources: Vec<Resource>) -> EngineOutput {
        let mut tagged: Vec<Resource> = resources
            .into_iter()
            .map(|mut resource| {
                let priority = self.tagger.tag(&resource.id);
                let _ = resource.attributes.insert(self.tagger.attribute_key().to_string(), priority.to_string());
                resource
            })
            .collect();

        for resource in &tagged {
            self.topk.add(&resource.id, resource.weight);
        }
        let retained_ids: HashSet<String> = self.topk.top_k().into_iter().map(|(id, _, _)| id).collect();

        let tunables = self.tunables.read();
        let strategy = tunables.strategy;
        let retained_priorities = tunables.retained_priorities.clone();
        drop(tunables);

        let mut retained = Vec::new();
        let mut to_rollup = Vec::new();
        for resource in tagged.drain(..) {
            let in_topk = retained_ids.contains(&resource.id);
            let priority_retained = match strategy {
                Strategy::TopK => false,
                Strategy::Hybrid => {
                    let tag = self.tagger.tag(&resource.id);
                    retained_priorities.contains(&tag)
                }
            };
            if in_topk || priority_retained {
                retained.push(resource);
            } else {
                to_rollup.push(resource);
            }
        }

        let rolled_up = self.rollup.aggregate(to_rollup);
        EngineOutput { retained, rolled_up }
    }

    /// Fraction of observed weight represented by the top-k retained set.
    #[must_use]
    pub fn coverage(&self) -> f64 {
        self.topk.coverage()
    }
}

impl ReconfigurableProcessor for CardinalityEngine {
    fn name(&self) -> &str {
        PROCESSOR_NAME
    }

    fn apply(&self, patch: &phoenix_config::ConfigPatch) -> Result<(), ConfigError> {
        match patch.parameter_path.as_str() {
            "capacity" => {
                let capacity = patch.new_value.as_i64_lossless().ok_or_else(|| {
                    ConfigError::for_patch(PatchErrorKind::InvalidParameter, patch.patch_id.clone(), "capacity must be an integer")
                })?;
                if capacity <= 0 {
                    return Err(ConfigError::for_patch(PatchErrorKind::InvalidParameter, patch.patch_id.clone(), "capacity must be positive"));
                }
                self.topk
                    .set_k(capacity as usize)
                    .map_err(|e| ConfigError::for_patch(PatchErrorKind::InvalidParameter, patch.patch_id.clone(), e.to_string()))?;
            }
            "strategy" => {
                let ConfigValue::String(value) = &patch.new_value else {
                    return Err(ConfigError::for_patch(PatchErrorKind::InvalidParameter, patch.patch_id.clone(), "strategy must be a string"));
                };
                let strategy = match value.as_str() {
                    "top_k" => Strategy::TopK,
                    "hybrid" => Strategy::Hybrid,
                    other => {
                        return Err(ConfigError::for_patch(
                            PatchErrorKind::InvalidParameter,
                            patch.patch_id.clone(),
                            format!("unknown strategy '{other}'"),
                        ));
                    }
                };
                self.tunables.write().strategy = strategy;
            }
            "enabled" => {
                let ConfigValue::Bool(value) = &patch.new_value else {
                    return Err(ConfigError::for_patch(PatchErrorKind::InvalidParameter, patch.patch_id.clone(), "enabled must be a bool"));
                };
                self.enabled.store(*value, Ordering::Relaxed);
            }
            other => {
                return Err(ConfigError::for_patch(PatchErrorKind::UnknownParameter, patch.patch_id.clone(), format!("unknown parameter '{other}'")));
            }
        }
        self.tunables.write().version = patch.version;
        self.updated_at.store(patch.timestamp, Ordering::Relaxed);
        Ok(())
    }

    fn status(&self) -> ConfigStatus {
        let tunables = self.tunables.read();
        let mut values = BTreeMap::new();
        let _ = values.insert("capacity".to_string(), ConfigValue::Int(self.topk.capacity() as i64));
        let strategy_name = match tunables.strategy {
            Strategy::TopK => "top_k",
            Strategy::Hybrid => "hybrid",
        };
        let _ = values.insert("strategy".to_string(), ConfigValue::String(strategy_name.to_string()));
        let _ = values.insert("enabled".to_string(), ConfigValue::Bool(self.enabled.load(Ordering::Relaxed)));
        ConfigStatus { values, enabled: self.enabled.load(Ordering::Relaxed), version: tunables.version, timestamp: self.updated_at.load(Ordering::Relaxed) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rollup::Aggregation;
    use phoenix_config::{ConfigPatch, Severity, Source};

    fn engine() -> CardinalityEngine {
        let tagger = PriorityTagger::new(vec![("^crit-.*".to_string(), Priority::Critical)], "phoenix.priority").expect("valid");
        let topk = TopK::new(2).expect("valid");
        let rollup = RollupEngine::new("rollup:", Aggregation::Sum);
        let mut retained = HashSet::new();
        let _ = retained.insert(Priority::Critical);
        CardinalityEngine::new(tagger, topk, rollup, Strategy::Hybrid, retained)
    }

    #[test]
    fn hybrid_strategy_retains_priority_tagged_even_when_not_top_k() {
        let engine = engine();
        let resources = vec![
            Resource::new("crit-a", "svc", 1).with_metric("m", 1.0, false),
            Resource::new("b", "svc", 100).with_metric("m", 1.0, false),
            Resource::new("c", "svc", 50).with_metric("m", 1.0, false),
        ];
        let output = engine.process_batch(resources);
        let ids: Vec<&str> = output.retained.iter().map(|r| r.id.as_str()).collect();
        assert!(ids.contains(&"crit-a"));
        assert!(ids.contains(&"b"));
    }

    #[test]
    fn non_retained_resources_are_rolled_up_by_category() {
        let engine = engine();
        let resources = vec![Resource::new("x", "svc", 1).with_metric("m", 1.0, false), Resource::new("y", "svc", 1).with_metric("m", 1.0, false)];
        let output = engine.process_batch(resources);
        assert!(!output.rolled_up.is_empty());
    }

    #[test]
    fn capacity_patch_resizes_topk() {
        let engine = engine();
        let patch = ConfigPatch {
            patch_id: "p1".to_string(),
            target: PROCESSOR_NAME.to_string(),
            parameter_path: "capacity".to_string(),
            new_value: ConfigValue::Int(5),
            prev_value: None,
            reason: "test".to_string(),
            severity: Severity::Normal,
            source: Source::Manual,
            timestamp: 100,
            ttl_seconds: 0,
            version: 1,
        };
        engine.apply(&patch).expect("applies");
        assert_eq!(engine.status().values.get("capacity"), Some(&ConfigValue::Int(5)));
    }
}

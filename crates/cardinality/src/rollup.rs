// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Rollup Engine: groups resources that are not individually retained by a
//! category key and aggregates their numeric series into one synthetic
//! resource per group (spec §4.G).

use std::collections::HashMap;

use crate::model::{MetricSample, Resource};

/// How a gauge series is aggregated across a rollup group. Monotonic sums
/// are always summed, regardless of this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Add values across the group.
    Sum,
    /// Average values across the group.
    Avg,
}

/// Groups and aggregates resources that fall out of the retained set.
pub struct RollupEngine {
    name_prefix: String,
    aggregation: Aggregation,
}

impl RollupEngine {
    /// Construct a rollup engine that prefixes synthetic identifiers with
    /// `name_prefix` and aggregates gauges with `aggregation`.
    #[must_use]
    pub fn new(name_prefix: impl Into<String>, aggregation: Aggregation) -> Self {
        Self { name_prefix: name_prefix.into(), aggregation }
    }

    /// Group `resources` by `category` and emit one aggregated resource per
    /// group, annotated with a `rollup.count` attribute recording how many
    /// resources were folded into it.
    #[must_use]
    pub fn aggregate(&self, resources: Vec<Resource>) -> Vec<Resource> {
        let mut groups: HashMap<String, Vec<Resource>> = HashMap::new();
        for resource in resources {
            groups.entry(resource.category.clone()).or_default().push(resource);
        }

        let mut rolled_up: Vec<Resource> = groups.into_iter().map(|(category, members)| self.aggregate_group(&category, members)).collect();
        rolled_up.sort_by(|a, b| a.id.cmp(&b.id));
        rolled_up
    }

    fn aggregate_group(&self, category: &str, members: Vec<Resource>) -> Resource {
        let count = members.len();
        let mut sums: HashMap<String, (f64, u32, bool)> = HashMap::new();
        let total_weight: u64 = members.iter().map(|m| m.weight).sum();

        for member in &members {
            for metric in &member.metrics {
                let entry = sums.entry(metric.name.clone()).or_insert((0.0, 0, metric.monotonic));
                entry.0 += metric.value;
                entry.1 += 1;
                entry.2 = entry.2 || metric.monotonic;
            }
        }

        let mut resource = Resource::new(format!("{}{category}", self.name_prefix), category, total_weight);
        for (name, (sum, observed, monotonic)) in sums {
            let value = if monotonic {
                sum
            } else {
                match self.aggregation {
                    Aggregation::Sum => sum,
                    Aggregation::Avg => sum / f64::from(observed.max(1)),
                }
            };
            resource.metrics.push(MetricSample { name, value, monotonic });
        }
        resource.metrics.sort_by(|a, b| a.name.cmp(&b.name));
        let _ = resource.attributes.insert("rollup.count".to_string(), count.to_string());
        resource
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_by_category_and_sums_monotonic_series() {
        let engine = RollupEngine::new("rollup:", Aggregation::Avg);
        let resources = vec![
            Resource::new("a", "db", 1).with_metric("requests_total", 10.0, true).with_metric("cpu_pct", 20.0, false),
            Resource::new("b", "db", 1).with_metric("requests_total", 5.0, true).with_metric("cpu_pct", 40.0, false),
        ];
        let rolled = engine.aggregate(resources);
        assert_eq!(rolled.len(), 1);
        let group = &rolled[0];
        assert_eq!(group.attributes.get("rollup.count"), Some(&"2".to_string()));
        let requests = group.metrics.iter().find(|m| m.name == "requests_total").expect("present");
        assert!((requests.value - 15.0).abs() < f64::EPSILON);
        let cpu = group.metrics.iter().find(|m| m.name == "cpu_pct").expect("present");
        assert!((cpu.value - 30.0).abs() < f64::EPSILON); // averaged, not summed
    }

    #[test]
    fn sum_aggregation_sums_gauges_too() {
        let engine = RollupEngine::new("rollup:", Aggregation::Sum);
        let resources = vec![
            Resource::new("a", "cache", 1).with_metric("mem_bytes", 100.0, false),
            Resource::new("b", "cache", 1).with_metric("mem_bytes", 50.0, false),
        ];
        let rolled = engine.aggregate(resources);
        assert!((rolled[0].metrics[0].value - 150.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_input_yields_no_groups() {
        let engine = RollupEngine::new("rollup:", Aggregation::Sum);
        assert!(engine.aggregate(Vec::new()).is_empty());
    }
}

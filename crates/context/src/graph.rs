// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Process-Context Learner: a directed child→parent graph with a damped
//! PageRank-style importance iteration (spec §4.I).

use std::collections::{BTreeMap, HashMap, HashSet};

use parking_lot::RwLock;

use crate::error::Error;

/// PID value meaning "no parent"; edges to it are omitted from the reverse
/// index rather than treated as a real node.
const NO_PARENT: u64 = 0;

/// Attribute key the learner's score is written back under (spec §4.I
/// "scores are then written back as a float attribute on records whose
/// pid is known").
pub const IMPORTANCE_SCORE_ATTRIBUTE: &str = "phoenix.process.importance_score";

/// Iteration stops early once the largest per-node score delta drops below
/// this tolerance.
const CONVERGENCE_TOLERANCE: f64 = 1e-9;

struct Inner {
    /// child pid -> observed parent pids (deduplicated, `NO_PARENT` excluded).
    edges: HashMap<u64, Vec<u64>>,
    scores: HashMap<u64, f64>,
    damping_factor: f64,
    iterations: u32,
    enabled: bool,
    version: u64,
    updated_at: u64,
}

impl Inner {
    fn nodes(&self) -> HashSet<u64> {
        let mut nodes = HashSet::new();
        for (child, parents) in &self.edges {
            let _ = nodes.insert(*child);
            nodes.extend(parents.iter().copied());
        }
        nodes
    }

    fn recompute(&mut self) {
        let nodes = self.nodes();
        let node_count = nodes.len();
        if node_count == 0 {
            self.scores.clear();
            return;
        }
        let n = node_count as f64;

        let mut out_degree: HashMap<u64, usize> = HashMap::new();
        let mut in_edges: HashMap<u64, Vec<u64>> = HashMap::new();
        for node in &nodes {
            let _ = out_degree.entry(*node).or_insert(0);
            let _ = in_edges.entry(*node).or_insert_with(Vec::new);
        }
        for (child, parents) in &self.edges {
            *out_degree.entry(*child).or_insert(0) = parents.len();
            for parent in parents {
                in_edges.entry(*parent).or_default().push(*child);
            }
        }

        let mut scores: HashMap<u64, f64> = nodes.iter().map(|node| (*node, 1.0 / n)).collect();
        let d = self.damping_factor;

        for _ in 0..self.iterations.max(1) {
            let sink_mass: f64 = nodes
                .iter()
                .filter(|node| out_degree.get(*node).copied().unwrap_or(0) == 0)
                .map(|node| scores.get(node).copied().unwrap_or(0.0))
                .sum();

            let mut next_scores = HashMap::with_capacity(nodes.len());
            let mut max_delta: f64 = 0.0;
            for node in &nodes {
                let incoming: f64 = in_edges
                    .get(node)
                    .into_iter()
                    .flatten()
                    .map(|child| {
                        let child_score = scores.get(child).copied().unwrap_or(0.0);
                        let child_out_degree = out_degree.get(child).copied().unwrap_or(0).max(1);
                        child_score / child_out_degree as f64
                    })
                    .sum();
                let next = (1.0 - d) / n + d * (sink_mass / n + incoming);
                let previous = scores.get(node).copied().unwrap_or(0.0);
                max_delta = max_delta.max((next - previous).abs());
                let _ = next_scores.insert(*node, next);
            }
            scores = next_scores;
            if max_delta < CONVERGENCE_TOLERANCE {
                break;
            }
        }

        self.scores = scores;
    }
}

/// Directed child→parent process graph with damped importance iteration.
pub struct ProcessContextGraph {
    inner: RwLock<Inner>,
}

impl ProcessContextGraph {
    /// Construct a graph with the given damping factor and iteration cap.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParameter`] if `damping_factor` is not in
    /// `(0, 1)` or `iterations` is zero.
    pub fn new(damping_factor: f64, iterations: u32) -> Result<Self, Error> {
        validate(damping_factor, iterations)?;
        Ok(Self {
            inner: RwLock::new(Inner {
                edges: HashMap::new(),
                scores: HashMap::new(),
                damping_factor,
                iterations,
                enabled: true,
                version: 0,
                updated_at: 0,
            }),
        })
    }

    /// Record an observed child→parent edge. `parent == 0` means "no
    /// known parent"; the child is still registered as a node but the
    /// edge itself is omitted.
    pub fn add_edge(&self, child: u64, parent: u64) {
        let mut inner = self.inner.write();
        let entry = inner.edges.entry(child).or_default();
        if parent != NO_PARENT && !entry.contains(&parent) {
            entry.push(parent);
        }
    }

    /// Recompute importance scores from the current edge set. Writers
    /// hold the exclusive lock for the duration of the update; readers
    /// may snapshot via [`Self::score`]/[`Self::scores`] concurrently
    /// with other readers.
    pub fn recompute(&self) {
        if !self.inner.read().enabled {
            return;
        }
        self.inner.write().recompute();
    }

    /// Importance score for `pid`, if known.
    #[must_use]
    pub fn score(&self, pid: u64) -> Option<f64> {
        self.inner.read().scores.get(&pid).copied()
    }

    /// Snapshot of every known pid's score.
    #[must_use]
    pub fn scores(&self) -> HashMap<u64, f64> {
        self.inner.read().scores.clone()
    }

    /// Sum of all current scores, for verifying near-normalization.
    #[must_use]
    pub fn score_sum(&self) -> f64 {
        self.inner.read().scores.values().sum()
    }

    /// Write `pid`'s current importance score into `attributes` under
    /// [`IMPORTANCE_SCORE_ATTRIBUTE`]. A record whose pid is unknown to the
    /// graph is left untouched (spec §4.I).
    pub fn annotate(&self, pid: u64, attributes: &mut BTreeMap<String, String>) {
        if let Some(score) = self.score(pid) {
            let _ = attributes.insert(IMPORTANCE_SCORE_ATTRIBUTE.to_string(), score.to_string());
        }
    }

    /// Whether the learner is currently enabled.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.inner.read().enabled
    }

    /// Enable or disable recomputation; scores are left as last computed.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.write().enabled = enabled;
    }

    /// Current damping factor.
    #[must_use]
    pub fn damping_factor(&self) -> f64 {
        self.inner.read().damping_factor
    }

    /// Set the damping factor.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParameter`] if not in `(0, 1)`.
    pub fn set_damping_factor(&self, damping_factor: f64) -> Result<(), Error> {
        if !(damping_factor > 0.0 && damping_factor < 1.0) {
            return Err(Error::invalid_parameter("damping_factor must be in (0, 1)"));
        }
        self.inner.write().damping_factor = damping_factor;
        Ok(())
    }

    /// Current iteration cap.
    #[must_use]
    pub fn iterations(&self) -> u32 {
        self.inner.read().iterations
    }

    /// Set the iteration cap.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParameter`] if `iterations` is zero.
    pub fn set_iterations(&self, iterations: u32) -> Result<(), Error> {
        if iterations == 0 {
            return Err(Error::invalid_parameter("iterations must be positive"));
        }
        self.inner.write().iterations = iterations;
        Ok(())
    }

    /// Last applied patch version, for the reconfigurable-processor status.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.read().version
    }

    pub(crate) fn record_patch(&self, version: u64, timestamp: u64) {
        let mut inner = self.inner.write();
        inner.version = version;
        inner.updated_at = timestamp;
    }

    pub(crate) fn updated_at(&self) -> u64 {
        self.inner.read().updated_at
    }
}

fn validate(damping_factor: f64, iterations: u32) -> Result<(), Error> {
    if !(damping_factor > 0.0 && damping_factor < 1.0) {
        return Err(Error::invalid_parameter("damping_factor must be in (0, 1)"));
    }
    if iterations == 0 {
        return Err(Error::invalid_parameter("iterations must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_sum_to_approximately_one() {
        let graph = ProcessContextGraph::new(0.85, 20).expect("valid");
        graph.add_edge(2, 1);
        graph.add_edge(3, 1);
        graph.add_edge(4, 2);
        graph.recompute();
        assert!((graph.score_sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn dangling_node_mass_is_redistributed() {
        let graph = ProcessContextGraph::new(0.85, 50).expect("valid");
        graph.add_edge(2, 1);
        graph.recompute();
        // node 1 is a sink (no outgoing edge); its score must still be
        // finite and included in the normalized total.
        assert!(graph.score(1).is_some());
        assert!((graph.score_sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn missing_parent_pid_zero_is_omitted_from_edges() {
        let graph = ProcessContextGraph::new(0.85, 20).expect("valid");
        graph.add_edge(5, 0);
        graph.recompute();
        // node 5 is still registered, just with no outgoing edge.
        assert!(graph.score(5).is_some());
    }

    #[test]
    fn disabled_learner_skips_recompute() {
        let graph = ProcessContextGraph::new(0.85, 20).expect("valid");
        graph.add_edge(2, 1);
        graph.set_enabled(false);
        graph.recompute();
        assert!(graph.score(1).is_none());
    }

    #[test]
    fn invalid_damping_factor_rejected() {
        assert!(ProcessContextGraph::new(0.0, 20).is_err());
        assert!(ProcessContextGraph::new(1.0, 20).is_err());
        assert!(ProcessContextGraph::new(0.5, 0).is_err());
    }

    #[test]
    fn annotate_writes_score_for_known_pid_only() {
        let graph = ProcessContextGraph::new(0.85, 20).expect("valid");
        graph.add_edge(2, 1);
        graph.recompute();

        let mut known = BTreeMap::new();
        graph.annotate(1, &mut known);
        assert!(known.contains_key(IMPORTANCE_SCORE_ATTRIBUTE));

        let mut unknown = BTreeMap::new();
        graph.annotate(999, &mut unknown);
        assert!(unknown.is_empty());
    }
}

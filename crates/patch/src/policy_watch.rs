// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Policy-file reload (spec §4.E, §5): watch a YAML policy artifact for
//! changes and apply its batch of patches atomically.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use notify::{Event, RecursiveMode, Watcher};
use phoenix_config::ConfigPatch;
use tracing::warn;

use crate::registry::Registry;

/// A policy artifact's contents: a batch of patches applied atomically
/// whenever the file changes.
#[derive(Debug, serde::Deserialize)]
pub struct PolicyArtifact {
    /// The patches to apply, in order, on each reload.
    pub patches: Vec<ConfigPatch>,
}

/// Parse a policy artifact from YAML bytes.
pub fn parse_policy_artifact(yaml: &str) -> Result<PolicyArtifact, serde_yaml::Error> {
    serde_yaml::from_str(yaml)
}

/// Read `path`, parse it as a [`PolicyArtifact`], and apply its patches to
/// `registry` atomically.
pub fn reload_from_path(registry: &Registry, path: &Path) -> Result<(), phoenix_config::Error> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        phoenix_config::Error::new(phoenix_config::PatchErrorKind::IOError, format!("reading policy file {}: {e}", path.display()))
    })?;
    let artifact = parse_policy_artifact(&contents).map_err(|e| {
        phoenix_config::Error::new(phoenix_config::PatchErrorKind::InvalidPatch, format!("parsing policy file {}: {e}", path.display()))
    })?;
    let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    registry.apply_batch(artifact.patches, now)
}

/// Spawn a filesystem watcher that reloads `path` into `registry` whenever
/// it changes. The returned `Watcher` must be kept alive for the duration
/// of the watch; dropping it stops delivery.
pub fn watch_policy_file(registry: Arc<Registry>, path: PathBuf) -> notify::Result<notify::RecommendedWatcher> {
    let watch_path = path.clone();
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| match event {
        Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
            if let Err(error) = reload_from_path(&registry, &watch_path) {
                warn!(error = %error, path = %watch_path.display(), "policy reload failed");
            }
        }
        Ok(_) => {}
        Err(error) => warn!(%error, "policy file watch error"),
    })?;
    watcher.watch(&path, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_policy_artifact_with_patches() {
        let yaml = r#"
patches:
  - patch_id: "p1"
    target: "topk"
    parameter_path: "capacity"
    new_value: { type: "int", value: 10 }
    reason: "bootstrap"
    severity: "normal"
    source: "manual"
    timestamp: 100
    ttl_seconds: 0
    version: 1
"#;
        let artifact = parse_policy_artifact(yaml).expect("parses");
        assert_eq!(artifact.patches.len(), 1);
        assert_eq!(artifact.patches[0].patch_id, "p1");
    }
}

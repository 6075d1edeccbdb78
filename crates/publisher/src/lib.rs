// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Control-Signal Publisher (spec §4.K): atomic, versioned publication of
//! the active optimisation profile to a YAML artifact that external
//! collectors re-read on each tick. Single-writer, advisory-file-lock
//! guarded; this process is the one legitimate singleton in the system
//! (spec §9).

pub mod artifact;
pub mod error;
mod lock;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde_yaml::Value;
use tracing::warn;

pub use artifact::{Artifact, ArtifactThresholds, CurrentMetrics, PipelineFlags, PublishRequest};
pub use error::Error;
use lock::FileLock;

/// Default bound on how long [`Publisher::publish`] waits to acquire the
/// advisory lock before giving up (spec §5 "Publisher's lock wait is
/// bounded by `LOCK_TIMEOUT`").
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

struct State {
    config_version: u64,
    last_profile_change_timestamp: Option<String>,
}

/// Publishes the optimisation-profile artifact under an advisory file
/// lock, rendering from a template and substituting the known fields
/// while preserving any the template adds beyond spec §6's schema (spec
/// §6 backward-compatibility clause).
pub struct Publisher {
    target_path: PathBuf,
    lock_path: PathBuf,
    template_path: PathBuf,
    correlation_prefix: String,
    lock_timeout: Duration,
    state: Mutex<State>,
}

impl Publisher {
    /// Construct a publisher writing to `target_path`, rendering from
    /// `template_path`. Fails at construction if the template cannot be
    /// read or parsed (spec §7: "a missing template artifact prevents
    /// start-up").
    ///
    /// If `target_path` already holds a valid artifact (e.g. across a
    /// restart), its `config_version` and `last_profile_change_timestamp`
    /// are adopted so the strictly-increasing invariant survives restarts;
    /// this is best-effort and silently ignored if absent or unparsable.
    pub fn new(
        target_path: impl Into<PathBuf>,
        template_path: impl Into<PathBuf>,
        correlation_prefix: impl Into<String>,
        lock_timeout: Duration,
    ) -> Result<Self, Error> {
        let target_path = target_path.into();
        let template_path = template_path.into();

        // Validate the template exists and parses; the rendered value is
        // re-read on every publish so a template edit takes effect
        // without restarting the process.
        let _ = load_template(&template_path)?;

        let lock_path = sibling_with_suffix(&target_path, ".lock");

        let (config_version, last_profile_change_timestamp) = std::fs::read_to_string(&target_path)
            .ok()
            .and_then(|contents| serde_yaml::from_str::<Artifact>(&contents).ok())
            .map_or((0, None), |artifact| (artifact.config_version, Some(artifact.last_profile_change_timestamp)));

        Ok(Self {
            target_path,
            lock_path,
            template_path,
            correlation_prefix: correlation_prefix.into(),
            lock_timeout,
            state: Mutex::new(State { config_version, last_profile_change_timestamp }),
        })
    }

    /// Publish `request` (spec §4.K `Publish`): acquire the lock, bump the
    /// version, render the artifact, write-fsync-rename, release the
    /// lock. The in-memory version counter only advances if the rename
    /// succeeds, so a failed cycle retries cleanly on the next tick.
    pub fn publish(&self, request: &PublishRequest, now_unix: u64) -> Result<Artifact, Error> {
        let lock = FileLock::acquire(&self.lock_path, self.lock_timeout)?;

        let result = self.publish_locked(request, now_unix);
        lock.release();
        result
    }

    fn publish_locked(&self, request: &PublishRequest, now_unix: u64) -> Result<Artifact, Error> {
        let mut state = self.state.lock();
        let next_version = state.config_version.saturating_add(1);
        let now = Utc::now();

        let last_profile_change_timestamp = if request.profile_changed {
            now.to_rfc3339()
        } else {
            state.last_profile_change_timestamp.clone().unwrap_or_else(|| now.to_rfc3339())
        };

        let artifact = Artifact {
            optimization_profile: request.profile,
            config_version: next_version,
            correlation_id: format!("{}-{now_unix}-v{next_version}", self.correlation_prefix),
            last_updated: now.to_rfc3339(),
            trigger_reason: request.trigger_reason.clone(),
            current_metrics: request.current_metrics,
            thresholds: request.thresholds,
            pipelines: request.pipelines,
            last_profile_change_timestamp,
        };

        let rendered = render(&self.template_path, &artifact)?;
        write_atomically(&self.target_path, &rendered)?;

        state.config_version = next_version;
        state.last_profile_change_timestamp = Some(artifact.last_profile_change_timestamp.clone());
        Ok(artifact)
    }

    /// The most recently successfully published version, or `0` if none
    /// has been published yet this process (or adopted from disk at
    /// construction).
    #[must_use]
    pub fn current_version(&self) -> u64 {
        self.state.lock().config_version
    }

    /// Path of the published artifact, for readers that want to reload it.
    #[must_use]
    pub fn target_path(&self) -> &Path {
        &self.target_path
    }
}

fn load_template(path: &Path) -> Result<Value, Error> {
    let contents = std::fs::read_to_string(path).map_err(|e| Error::io("reading template artifact", &e))?;
    serde_yaml::from_str(&contents).map_err(|e| Error::InvalidTemplate { message: e.to_string() })
}

/// Render `artifact` over the template at `template_path`: known fields
/// are overwritten, anything else the template carries is preserved
/// verbatim (spec §6: "additional keys must not remove existing ones").
fn render(template_path: &Path, artifact: &Artifact) -> Result<String, Error> {
    let mut template = load_template(template_path)?;
    let rendered = serde_yaml::to_value(artifact).map_err(|e| Error::InvalidTemplate { message: e.to_string() })?;

    match (&mut template, rendered) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                let _ = base.insert(key, value);
            }
        }
        _ => return serde_yaml::to_string(artifact).map_err(|e| Error::InvalidTemplate { message: e.to_string() }),
    }

    serde_yaml::to_string(&template).map_err(|e| Error::InvalidTemplate { message: e.to_string() })
}

fn write_atomically(target_path: &Path, contents: &str) -> Result<(), Error> {
    use std::io::Write;

    let temp_path = sibling_with_suffix(target_path, &format!(".tmp.{}", std::process::id()));

    let mut file = std::fs::File::create(&temp_path).map_err(|e| Error::io("creating temp artifact file", &e))?;
    file.write_all(contents.as_bytes()).map_err(|e| Error::io("writing temp artifact file", &e))?;
    file.sync_all().map_err(|e| Error::io("fsyncing temp artifact file", &e))?;
    drop(file);

    std::fs::rename(&temp_path, target_path).map_err(|e| {
        if let Err(cleanup_error) = std::fs::remove_file(&temp_path) {
            warn!(error = %cleanup_error, path = %temp_path.display(), "failed to clean up temp artifact after failed rename");
        }
        Error::io("renaming temp artifact into place", &e)
    })
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use phoenix_profile::Profile;

    const TEMPLATE: &str = r#"
optimization_profile: balanced
config_version: 0
correlation_id: ""
last_updated: ""
trigger_reason: ""
current_metrics:
  full_ts: 0
  optimized_ts: 0
  experimental_ts: 0
  cost_reduction_ratio: 0.0
thresholds:
  conservative_max_ts: 15000
  aggressive_min_ts: 25000
pipelines:
  experimental_enabled: false
last_profile_change_timestamp: ""
extra_vendor_key: keep_me
"#;

    fn request(profile: Profile, changed: bool) -> PublishRequest {
        PublishRequest {
            profile,
            trigger_reason: "test".to_string(),
            current_metrics: CurrentMetrics { full_ts: 50_000, optimized_ts: 10_000, experimental_ts: 5_000, cost_reduction_ratio: 0.8 },
            thresholds: ArtifactThresholds { conservative_max_ts: 15_000, aggressive_min_ts: 25_000 },
            pipelines: PipelineFlags { experimental_enabled: true },
            profile_changed: changed,
        }
    }

    fn publisher(dir: &std::path::Path) -> Publisher {
        let template_path = dir.join("template.yaml");
        std::fs::write(&template_path, TEMPLATE).expect("write template");
        Publisher::new(dir.join("optimization_mode.yaml"), template_path, "pv3ux", Duration::from_millis(500)).expect("constructs")
    }

    #[test]
    fn publish_writes_parseable_yaml_with_incrementing_version() {
        let dir = tempfile::tempdir().expect("tempdir");
        let publisher = publisher(dir.path());

        let first = publisher.publish(&request(Profile::Conservative, true), 1_000).expect("first publish");
        assert_eq!(first.config_version, 1);
        let second = publisher.publish(&request(Profile::Balanced, false), 1_060).expect("second publish");
        assert_eq!(second.config_version, 2);
        assert!(second.config_version > first.config_version);

        let contents = std::fs::read_to_string(publisher.target_path()).expect("reads artifact");
        let parsed: Artifact = serde_yaml::from_str(&contents).expect("parses as artifact");
        assert_eq!(parsed.config_version, 2);
        assert_eq!(parsed.optimization_profile, Profile::Balanced);
    }

    #[test]
    fn template_extra_keys_survive_into_published_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let publisher = publisher(dir.path());
        publisher.publish(&request(Profile::Aggressive, true), 2_000).expect("publishes");
        let contents = std::fs::read_to_string(publisher.target_path()).expect("reads artifact");
        assert!(contents.contains("extra_vendor_key"));
    }

    #[test]
    fn profile_change_timestamp_only_advances_on_actual_transition() {
        let dir = tempfile::tempdir().expect("tempdir");
        let publisher = publisher(dir.path());
        let first = publisher.publish(&request(Profile::Conservative, true), 1_000).expect("publishes");
        let second = publisher.publish(&request(Profile::Conservative, false), 1_100).expect("publishes");
        assert_eq!(first.last_profile_change_timestamp, second.last_profile_change_timestamp);
    }

    #[test]
    fn missing_template_fails_construction() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = Publisher::new(dir.path().join("artifact.yaml"), dir.path().join("missing.yaml"), "pv3ux", Duration::from_millis(100));
        assert!(result.is_err());
    }

    #[test]
    fn restart_adopts_prior_version_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let publisher = publisher(dir.path());
        publisher.publish(&request(Profile::Balanced, true), 1_000).expect("publishes");
        drop(publisher);

        let reopened = publisher(dir.path());
        assert_eq!(reopened.current_version(), 1);
        let next = reopened.publish(&request(Profile::Balanced, false), 1_100).expect("publishes");
        assert_eq!(next.config_version, 2);
    }
}

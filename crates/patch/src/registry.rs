// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Reconfigurable Processor Registry / Arbiter (spec §4.E).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use phoenix_config::{ConfigPatch, ConfigStatus, Error, PatchErrorKind, Severity};

use crate::validator::Validator;

/// Capability every reconfigurable processor exposes to the registry. The
/// registry holds only this reference; the processor holds no back
/// reference to the registry (spec §9, cutting the cyclic reference).
pub trait ReconfigurableProcessor: Send + Sync {
    /// Stable identity used as the patch `target`.
    fn name(&self) -> &str;

    /// Apply a patch that the registry has already validated and
    /// version-checked. Implementations own their `ConfigStatus`
    /// exclusively and must make the update atomic with respect to
    /// concurrent `status()` calls.
    fn apply(&self, patch: &ConfigPatch) -> Result<(), Error>;

    /// Current self-description.
    fn status(&self) -> ConfigStatus;
}

/// Submission/application counters, split by outcome.
#[derive(Debug, Default)]
pub struct RegistryCounters {
    applied: AtomicU64,
    rejected: AtomicU64,
}

impl RegistryCounters {
    /// Number of patches applied successfully.
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    /// Number of patches rejected, by the validator or at apply time.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Discovers and routes patches to reconfigurable processors. A single
/// mutex serialises `submit` (spec §5 ordering guarantee); each
/// processor's own `apply`/`status` hold their own lock internally.
pub struct Registry {
    validator: Validator,
    processors: Mutex<HashMap<String, Arc<dyn ReconfigurableProcessor>>>,
    submit_lock: Mutex<()>,
    safe_mode: AtomicBool,
    counters: RegistryCounters,
}

impl Registry {
    /// Construct an empty registry backed by `validator`.
    #[must_use]
    pub fn new(validator: Validator) -> Self {
        Self {
            validator,
            processors: Mutex::new(HashMap::new()),
            submit_lock: Mutex::new(()),
            safe_mode: AtomicBool::new(false),
            counters: RegistryCounters::default(),
        }
    }

    /// Register a processor under its own name.
    pub fn register(&self, processor: Arc<dyn ReconfigurableProcessor>) {
        let _ = self.processors.lock().insert(processor.name().to_string(), processor);
    }

    /// Enter or leave safe-mode (spec §4.E); callers are expected to emit
    /// the entry/exit metric event themselves since the registry has no
    /// emitter dependency of its own.
    pub fn set_safe_mode(&self, active: bool) {
        self.safe_mode.store(active, Ordering::Relaxed);
    }

    /// Whether safe-mode is currently active.
    pub fn safe_mode(&self) -> bool {
        self.safe_mode.load(Ordering::Relaxed)
    }

    /// Submit a patch for validation and application (spec §4.E `Submit`).
    pub fn submit(&self, mut patch: ConfigPatch, now: u64) -> Result<(), Error> {
        let _guard = self.submit_lock.lock();

        if self.safe_mode() && patch.severity != Severity::Safety {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(Error::for_patch(PatchErrorKind::ProcessorDisabled, patch.patch_id.clone(), "registry is in safe-mode"));
        }

        if let Err(error) = self.validator.validate(&patch, now) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(error);
        }

        let processors = self.processors.lock();
        let Some(processor) = processors.get(&patch.target).cloned() else {
            drop(processors);
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(Error::for_patch(PatchErrorKind::UnknownParameter, patch.patch_id.clone(), format!("unknown target '{}'", patch.target)));
        };
        drop(processors);

        let current_status = processor.status();
        if !current_status.enabled && patch.severity != Severity::Safety {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(Error::for_patch(PatchErrorKind::ProcessorDisabled, patch.patch_id.clone(), "target processor is disabled"));
        }
        patch.prev_value = current_status.get(&patch.parameter_path).cloned();
        if patch.version <= current_status.version && current_status.version != 0 {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(Error::for_patch(
                PatchErrorKind::VersionConflict,
                patch.patch_id.clone(),
                format!("patch version {} does not exceed current version {}", patch.version, current_status.version),
            ));
        }

        match processor.apply(&patch) {
            Ok(()) => {
                self.counters.applied.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(error) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(error)
            }
        }
    }

    /// spec §4.E `Status`: fan out to the named processor. The registry
    /// itself holds no authoritative parameter data.
    pub fn status(&self, target: &str) -> Option<ConfigStatus> {
        self.processors.lock().get(target).map(|processor| processor.status())
    }

    /// Statuses for every registered processor, by target name.
    pub fn status_all(&self) -> HashMap<String, ConfigStatus> {
        self.processors.lock().iter().map(|(name, processor)| (name.clone(), processor.status())).collect()
    }

    /// Submission/application counters.
    pub fn counters(&self) -> &RegistryCounters {
        &self.counters
    }

    /// Apply a batch of patches atomically: all succeed, or every
    /// already-applied patch in the batch is rolled back in reverse order
    /// (spec §4.E policy reload). Rollback re-applies each processor's
    /// `prev_value` as a synthetic patch; it is best-effort if a
    /// processor's `apply` itself fails during rollback.
    pub fn apply_batch(&self, patches: Vec<ConfigPatch>, now: u64) -> Result<(), Error> {
        let mut applied = Vec::with_capacity(patches.len());
        for patch in patches {
            match self.submit(patch.clone(), now) {
                Ok(()) => applied.push(patch),
                Err(error) => {
                    for rolled_back in applied.into_iter().rev() {
                        if let Some(prev_value) = rolled_back.prev_value.clone() {
                            let mut undo = rolled_back.clone();
                            undo.new_value = prev_value;
                            undo.version = undo.version.saturating_add(1);
                            let _ = self.submit(undo, now);
                        }
                    }
                    return Err(error);
                }
            }
        }
        Ok(())
    }
}

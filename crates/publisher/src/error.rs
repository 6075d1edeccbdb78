// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors raised by the control-signal publisher.

use thiserror::Error;

/// Errors publishing the optimisation-profile artifact (spec §4.K, §7).
#[derive(Debug, Error)]
pub enum Error {
    /// A filesystem operation (read, write, fsync, rename) failed. The
    /// in-memory state is not advanced; the next tick retries (spec §7).
    #[error("publisher IO error: {message}")]
    IOError {
        /// Human-readable detail.
        message: String,
    },

    /// The advisory file lock could not be acquired before `LOCK_TIMEOUT`
    /// elapsed.
    #[error("timed out acquiring publisher lock after {waited_ms}ms")]
    LockTimeout {
        /// How long the acquisition attempt waited, in milliseconds.
        waited_ms: u64,
    },

    /// The template artifact did not parse as YAML.
    #[error("template artifact is not valid YAML: {message}")]
    InvalidTemplate {
        /// Human-readable detail.
        message: String,
    },
}

impl Error {
    /// Wrap a `std::io::Error` with context about which operation failed.
    pub fn io(context: &str, source: &std::io::Error) -> Self {
        Self::IOError { message: format!("{context}: {source}") }
    }
}

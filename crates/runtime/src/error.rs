// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Error type for task spawning and joining.

/// Errors raised while spawning or joining a managed background task.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The spawned task's future panicked.
    #[error("task '{task_name}' panicked: {panic_message}")]
    TaskPanic {
        /// Name of the task that panicked.
        task_name: String,
        /// Panic payload, formatted for display.
        panic_message: String,
    },

    /// The spawned task's future returned an error.
    #[error("task '{task_name}' failed: {message}")]
    TaskFailed {
        /// Name of the task that failed.
        task_name: String,
        /// Failure detail.
        message: String,
    },
}

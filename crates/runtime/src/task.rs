// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Spawn a cancellable background task on the shared Tokio runtime.
//!
//! Every long-running component (observer scrape loop, profile selector
//! tick, controller-assembly compute loop, self-metrics emit loop) shares
//! one multi-threaded runtime rather than a dedicated OS thread per task,
//! since none of them need CPU-core affinity.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// Handle to a task spawned via [`spawn_task`].
pub struct TaskHandle<T, E> {
    cancel_token: CancellationToken,
    join_handle: Option<JoinHandle<Result<T, E>>>,
    name: String,
}

impl<T, E> TaskHandle<T, E> {
    /// Request cancellation via the token. Idempotent, best-effort: the
    /// task must itself observe the token and exit promptly.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    /// The cancellation token driving this task, for callers that want to
    /// fan a single shutdown signal out to several tasks.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Request shutdown, then await completion.
    ///
    /// # Errors
    /// Returns [`Error::TaskPanic`] if the task panicked, or
    /// [`Error::TaskFailed`] if it returned `Err`.
    pub async fn shutdown_and_join(mut self) -> Result<T, Error>
    where
        E: std::fmt::Display,
    {
        self.shutdown();
        let handle = self.join_handle.take().expect("join handle taken exactly once");
        match handle.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(Error::TaskFailed { task_name: self.name, message: error.to_string() }),
            Err(join_error) => Err(Error::TaskPanic { task_name: self.name, panic_message: join_error.to_string() }),
        }
    }
}

/// Spawn `task_factory`'s future on the shared runtime under `task_name`.
/// The factory receives a [`CancellationToken`] that is cancelled when
/// shutdown is requested; the task should observe it and exit promptly.
pub fn spawn_task<T, E, Fut, F>(task_name: impl Into<String>, task_factory: F) -> TaskHandle<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    F: FnOnce(CancellationToken) -> Fut,
{
    let name = task_name.into();
    let token = CancellationToken::new();
    let task_token = token.clone();
    let join_handle = tokio::spawn(task_factory(task_token));
    TaskHandle { cancel_token: token, join_handle: Some(join_handle), name }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_and_join_returns_task_output() {
        let handle = spawn_task("test", |_token| async { Ok::<_, std::convert::Infallible>(42) });
        let result = handle.shutdown_and_join().await.expect("joins");
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn cancelled_task_can_observe_token() {
        let handle = spawn_task("test", |token| async move {
            token.cancelled().await;
            Ok::<_, std::convert::Infallible>(())
        });
        handle.shutdown_and_join().await.expect("joins after observing cancellation");
    }

    #[tokio::test]
    async fn task_error_is_surfaced() {
        let handle = spawn_task("test", |_token| async { Err::<(), _>("boom") });
        let result = handle.shutdown_and_join().await;
        assert!(matches!(result, Err(Error::TaskFailed { .. })));
    }
}

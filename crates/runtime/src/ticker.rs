// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Run a fallible closure on a fixed period until cancelled.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Invoke `on_tick` every `period`, stopping as soon as `cancel` fires. A
/// tick that returns `Err` is logged and the loop continues; a tick is
/// never retried or skipped by backpressure from a slow previous tick
/// since `on_tick` is awaited to completion before the next interval
/// fires (spec components tick faster than they execute in practice).
pub async fn run_periodic<F, Fut, E>(task_name: &str, period: Duration, cancel: CancellationToken, mut on_tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                return;
            }
            _ = interval.tick() => {
                if let Err(error) = on_tick().await {
                    warn!(task = task_name, %error, "periodic tick failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn stops_promptly_on_cancellation() {
        let cancel = CancellationToken::new();
        let ticks = Arc::new(AtomicU32::new(0));
        let ticks_for_closure = ticks.clone();
        let cancel_for_task = cancel.clone();
        let task = tokio::spawn(async move {
            run_periodic("test", Duration::from_millis(5), cancel_for_task, move || {
                let ticks = ticks_for_closure.clone();
                async move {
                    ticks.fetch_add(1, Ordering::Relaxed);
                    Ok::<(), std::convert::Infallible>(())
                }
            })
            .await;
        });
        tokio::time::sleep(Duration::from_millis(25)).await;
        cancel.cancel();
        task.await.expect("task joins");
        assert!(ticks.load(Ordering::Relaxed) > 0);
    }
}

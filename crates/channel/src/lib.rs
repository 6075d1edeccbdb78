// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Bounded channels for inter-component communication (patches, anomaly
//! events) with an explicit drop-oldest overflow policy instead of
//! backpressure: a slow or wedged consumer must never stall the producer.

pub mod error;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub use error::Error;

/// The sending half of a bounded, drop-oldest channel.
///
/// Internally this keeps a second receiver handle purely to drain the
/// oldest queued item when the channel is full; callers never observe it.
#[derive(Clone)]
pub struct Sender<T> {
    name: Arc<str>,
    tx: flume::Sender<T>,
    drain: flume::Receiver<T>,
    dropped: Arc<AtomicU64>,
}

/// The receiving half of a bounded, drop-oldest channel.
#[derive(Clone)]
pub struct Receiver<T> {
    rx: flume::Receiver<T>,
}

/// Create a bounded channel with capacity `capacity`, identified by `name`
/// for diagnostics and the overflow counter.
#[must_use]
pub fn bounded<T>(name: impl Into<Arc<str>>, capacity: usize) -> (Sender<T>, Receiver<T>) {
    let (tx, rx) = flume::bounded(capacity);
    let sender = Sender {
        name: name.into(),
        tx,
        drain: rx.clone(),
        dropped: Arc::new(AtomicU64::new(0)),
    };
    let receiver = Receiver { rx };
    (sender, receiver)
}

impl<T> Sender<T> {
    /// Attempt to enqueue `value`. If the channel is at capacity, the oldest
    /// queued value is dropped (and the overflow counter incremented) to
    /// make room. Fails only if every receiver has gone away.
    pub fn send_drop_oldest(&self, value: T) -> Result<(), Error> {
        match self.tx.try_send(value) {
            Ok(()) => Ok(()),
            Err(flume::TrySendError::Full(value)) => {
                // Best-effort: another producer may win the race to drain
                // the same slot, in which case our retry still succeeds
                // because the consumer is by definition not keeping up.
                let _ = self.drain.try_recv();
                self.dropped.fetch_add(1, Ordering::Relaxed);
                self.tx
                    .try_send(value)
                    .map_err(|_| Error::Closed { name: self.name.to_string() })
            }
            Err(flume::TrySendError::Disconnected(_)) => {
                Err(Error::Closed { name: self.name.to_string() })
            }
        }
    }

    /// Total number of values dropped due to overflow since creation.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Channel name, as supplied to [`bounded`].
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Receiver<T> {
    /// Await the next value, or `None` once every sender has gone away.
    pub async fn recv(&self) -> Option<T> {
        self.rx.recv_async().await.ok()
    }

    /// Non-blocking receive.
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

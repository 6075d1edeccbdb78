// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the bounded-channel crate.

use thiserror::Error;

/// Errors that can occur sending or receiving on a bounded channel.
#[derive(Error, Debug)]
pub enum Error {
    /// All receivers have been dropped; the message could not be delivered.
    #[error("channel '{name}' is closed, no receivers remain")]
    Closed {
        /// Name of the channel, for diagnostics.
        name: String,
    },
}

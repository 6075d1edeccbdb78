// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Error type for the process-context learner.

/// Errors raised by the process-context learner.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A constructor or setter was given an out-of-range parameter.
    #[error("invalid parameter: {message}")]
    InvalidParameter {
        /// Human-readable detail.
        message: String,
    },
}

impl Error {
    /// Build an [`Error::InvalidParameter`].
    #[must_use]
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter { message: message.into() }
    }
}

// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the PID kernel and controller assembly.

use thiserror::Error;

/// Errors that can occur constructing or driving a PID controller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A gain, limit or coefficient was outside its valid domain.
    #[error("invalid parameter: {message}")]
    InvalidParameter {
        /// Human-readable detail of which parameter and why.
        message: String,
    },
}

impl Error {
    /// Construct an `InvalidParameter` error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter { message: message.into() }
    }
}

// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Error types shared across the patch fabric.

use serde::Serialize;
use thiserror::Error;

/// The kind of a patch-related failure, stable across the validator, the
/// registry and the HTTP surface so that callers can match on it without
/// parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchErrorKind {
    /// A required field was missing or empty.
    InvalidPatch,
    /// The target processor does not expose the named parameter.
    UnknownParameter,
    /// The parameter path failed lexical validation.
    InvalidParameter,
    /// The target processor does not support this kind of mutation.
    UnsupportedOperation,
    /// The target processor is disabled and cannot accept patches.
    ProcessorDisabled,
    /// The patch's `version` conflicts with the processor's current version.
    VersionConflict,
    /// The submission rate limit was exceeded.
    RateLimited,
    /// The cooldown since the last successful patch has not elapsed.
    Cooldown,
    /// The patch's TTL elapsed before it could be applied.
    Expired,
    /// A filesystem operation failed.
    IOError,
    /// A scrape target did not respond in time.
    ScrapeUnavailable,
    /// The oscillation detector is tripped and the operation was refused.
    Oscillation,
}

/// A structured, typed error carrying enough context for both the caller
/// and the HTTP `{kind, message, patch_id?}` body (see the admin crate).
#[derive(Debug, Error, Clone, Serialize)]
#[error("{kind:?}: {message}")]
pub struct Error {
    /// Stable machine-readable error kind.
    pub kind: PatchErrorKind,
    /// Human-readable detail.
    pub message: String,
    /// The patch this error concerns, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_id: Option<String>,
}

impl Error {
    /// Construct an error with no associated patch id.
    pub fn new(kind: PatchErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), patch_id: None }
    }

    /// Construct an error associated with a specific patch id.
    pub fn for_patch(kind: PatchErrorKind, patch_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), patch_id: Some(patch_id.into()) }
    }
}

// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Configuration model shared across the control plane: the `ConfigPatch` /
//! `ConfigStatus` data model, validator policy and environment-driven
//! settings.

pub mod error;
pub mod patch;
pub mod policy;
pub mod settings;

pub use error::{Error, PatchErrorKind};
pub use patch::{ConfigPatch, ConfigStatus, ConfigValue, Severity, Source, is_valid_parameter_path};
pub use policy::ValidatorPolicy;
pub use settings::Settings;

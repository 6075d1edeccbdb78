// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Configuration-Patch Fabric: the validator and the reconfigurable
//! processor registry/arbiter that routes patches to processors (spec
//! §4.D-E).

pub mod policy_watch;
pub mod registry;
pub mod validator;

pub use registry::{ReconfigurableProcessor, Registry, RegistryCounters};
pub use validator::Validator;

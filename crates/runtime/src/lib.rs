// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Background task spawning and periodic execution shared by every
//! long-running component: the observer scrape loop, the profile
//! selector's tick, the controller-assembly compute loop and the
//! self-metrics emit loop all use the same cancellation-token-driven
//! primitives.

pub mod error;
pub mod task;
pub mod ticker;

pub use error::Error;
pub use task::{spawn_task, TaskHandle};
pub use ticker::run_periodic;

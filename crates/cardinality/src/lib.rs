// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Cardinality reduction: the Space-Saving top-k sketch, the rollup
//! aggregator and the priority tagger, composed into the reconfigurable
//! [`engine::CardinalityEngine`] (spec §4.F-H).

pub mod engine;
pub mod error;
pub mod model;
pub mod priority;
pub mod rollup;
pub mod topk;

pub use engine::{CardinalityEngine, EngineOutput, Strategy, PROCESSOR_NAME};
pub use error::Error;
pub use model::{MetricSample, Resource};
pub use priority::{Priority, PriorityTagger};
pub use rollup::{Aggregation, RollupEngine};
pub use topk::TopK;

// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Process-Context Learner: PageRank-style importance propagation over the
//! process parent/child graph, exposed as a reconfigurable processor
//! (spec §4.I).

pub mod error;
pub mod graph;
pub mod processor;

pub use error::Error;
pub use graph::{ProcessContextGraph, IMPORTANCE_SCORE_ATTRIBUTE};
pub use processor::PROCESSOR_NAME;

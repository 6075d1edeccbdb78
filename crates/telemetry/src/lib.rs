// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Uniform self-metrics facade: gauge, counter and histogram instruments
//! with a JSON-snapshot collector (spec §4.N). This is deliberately not an
//! OpenTelemetry SDK binding or a Prometheus exposition-format encoder —
//! the control plane's own health surface is a flat JSON snapshot, not a
//! scrape target in its own right.

pub mod instruments;
pub mod registry;

pub use instruments::{Attributes, Counter, Gauge, Histogram, HistogramSnapshot};
pub use registry::{DefaultAttributes, EmitCadence, InstrumentReading, MetricsRegistry, MetricsSnapshot};

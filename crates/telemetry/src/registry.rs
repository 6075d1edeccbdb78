// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The unified instrument collector (spec §4.N).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::instruments::{Attributes, Counter, Gauge, Histogram, HistogramSnapshot};

/// An instrument's full identity: its name plus the per-call attributes
/// it was fetched with (spec §4.N: "each instrument carries default
/// attributes ... plus per-call attributes"). Two calls with the same
/// name but different attributes address distinct instrument instances.
type InstrumentKey = (String, Attributes);

fn instrument_key(name: &str, attributes: &[(&str, &str)]) -> InstrumentKey {
    (name.to_string(), attributes.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect())
}

/// Default attributes stamped on every instrument registered through a
/// given [`MetricsRegistry`]: the component name and a process-scoped
/// instance id.
#[derive(Debug, Clone)]
pub struct DefaultAttributes {
    /// Logical component name (e.g. `"controller_assembly"`).
    pub component: String,
    /// Instance identifier, unique per running process.
    pub instance_id: String,
}

/// A named collection of counters, gauges and histograms for one component,
/// plus the cadence gate controlling how often [`MetricsRegistry::emit`]
/// actually produces a snapshot.
pub struct MetricsRegistry {
    defaults: DefaultAttributes,
    counters: RwLock<BTreeMap<InstrumentKey, Arc<Counter>>>,
    gauges: RwLock<BTreeMap<InstrumentKey, Arc<Gauge>>>,
    histograms: RwLock<BTreeMap<InstrumentKey, Arc<Histogram>>>,
    cadence: EmitCadence,
}

/// One instrument's point-in-time reading, identified by name plus the
/// attributes it was recorded under.
#[derive(Debug, Clone, Serialize)]
pub struct InstrumentReading<V> {
    /// Instrument name.
    pub name: String,
    /// Per-call attributes this instance was fetched with.
    pub attributes: Attributes,
    /// Current value.
    pub value: V,
}

/// A point-in-time export of every instrument registered with a
/// [`MetricsRegistry`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// The component these instruments belong to.
    pub component: String,
    /// The emitting process instance id.
    pub instance_id: String,
    /// Current counter values.
    pub counters: Vec<InstrumentReading<f64>>,
    /// Current gauge values.
    pub gauges: Vec<InstrumentReading<f64>>,
    /// Current histogram snapshots.
    pub histograms: Vec<InstrumentReading<HistogramSnapshot>>,
}

impl MetricsRegistry {
    /// Construct a registry stamping every instrument with `defaults` and
    /// emitting no more often than `interval`.
    #[must_use]
    pub fn new(defaults: DefaultAttributes, interval: Duration) -> Self {
        Self {
            defaults,
            counters: RwLock::new(BTreeMap::new()),
            gauges: RwLock::new(BTreeMap::new()),
            histograms: RwLock::new(BTreeMap::new()),
            cadence: EmitCadence::new(interval),
        }
    }

    /// Fetch or create the counter identified by `name` and `attributes`.
    /// Distinct attribute sets under the same name address distinct
    /// instruments (spec §4.N per-call attributes).
    pub fn counter(&self, name: &str, attributes: &[(&str, &str)]) -> Arc<Counter> {
        let key = instrument_key(name, attributes);
        if let Some(existing) = self.counters.read().get(&key) {
            return Arc::clone(existing);
        }
        Arc::clone(self.counters.write().entry(key).or_insert_with(|| Arc::new(Counter::default())))
    }

    /// Fetch or create the gauge identified by `name` and `attributes`.
    pub fn gauge(&self, name: &str, attributes: &[(&str, &str)]) -> Arc<Gauge> {
        let key = instrument_key(name, attributes);
        if let Some(existing) = self.gauges.read().get(&key) {
            return Arc::clone(existing);
        }
        Arc::clone(self.gauges.write().entry(key).or_insert_with(|| Arc::new(Gauge::default())))
    }

    /// Fetch or create the histogram identified by `name` and `attributes`,
    /// with the given bucket bounds. The bounds are only used the first
    /// time the histogram is created.
    pub fn histogram(&self, name: &str, attributes: &[(&str, &str)], bounds: &[f64]) -> Arc<Histogram> {
        let key = instrument_key(name, attributes);
        if let Some(existing) = self.histograms.read().get(&key) {
            return Arc::clone(existing);
        }
        Arc::clone(self.histograms.write().entry(key).or_insert_with(|| Arc::new(Histogram::new(bounds.to_vec()))))
    }

    /// Snapshot every instrument unconditionally, bypassing the cadence
    /// gate. Used by the HTTP `/metrics` handler, which must always answer.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            component: self.defaults.component.clone(),
            instance_id: self.defaults.instance_id.clone(),
            counters: self
                .counters
                .read()
                .iter()
                .map(|((name, attributes), v)| InstrumentReading { name: name.clone(), attributes: attributes.clone(), value: v.value() })
                .collect(),
            gauges: self
                .gauges
                .read()
                .iter()
                .map(|((name, attributes), v)| InstrumentReading { name: name.clone(), attributes: attributes.clone(), value: v.value() })
                .collect(),
            histograms: self
                .histograms
                .read()
                .iter()
                .map(|((name, attributes), v)| InstrumentReading { name: name.clone(), attributes: attributes.clone(), value: v.snapshot() })
                .collect(),
        }
    }

    /// Snapshot and dispatch, gated by the configured cadence. Returns
    /// `None` when called again before `interval` has elapsed.
    pub fn emit(&self, now: Instant) -> Option<MetricsSnapshot> {
        self.cadence.should_emit(now).then(|| self.snapshot())
    }
}

/// Governs how often a periodic emitter actually produces output.
pub struct EmitCadence {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl EmitCadence {
    /// Construct a cadence gate firing no more than once per `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: Mutex::new(None) }
    }

    /// Check-and-set: returns `true` (and records `now`) only if `interval`
    /// has elapsed since the last `true` result.
    pub fn should_emit(&self, now: Instant) -> bool {
        let mut last = self.last.lock();
        match *last {
            Some(prev) if now.duration_since(prev) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> MetricsRegistry {
        MetricsRegistry::new(
            DefaultAttributes { component: "test".to_string(), instance_id: "i-1".to_string() },
            Duration::from_secs(10),
        )
    }

    #[test]
    fn snapshot_reflects_instrument_state() {
        let reg = registry();
        reg.counter("applied", &[]).add(3.0);
        reg.gauge("integral", &[]).set(42.0);
        let snap = reg.snapshot();
        assert_eq!(snap.counters.iter().find(|r| r.name == "applied").map(|r| r.value), Some(3.0));
        assert_eq!(snap.gauges.iter().find(|r| r.name == "integral").map(|r| r.value), Some(42.0));
        assert_eq!(snap.component, "test");
    }

    #[test]
    fn same_name_different_attributes_are_distinct_instruments() {
        let reg = registry();
        reg.gauge("phoenix_observer_kpi_store_value", &[("phoenix_pipeline_label", "full_fidelity")]).set(1.0);
        reg.gauge("phoenix_observer_kpi_store_value", &[("phoenix_pipeline_label", "optimised")]).set(2.0);
        let snap = reg.snapshot();
        let readings: Vec<_> = snap.gauges.iter().filter(|r| r.name == "phoenix_observer_kpi_store_value").collect();
        assert_eq!(readings.len(), 2);
        assert!(readings.iter().any(|r| r.attributes.get("phoenix_pipeline_label").map(String::as_str) == Some("full_fidelity") && r.value == 1.0));
        assert!(readings.iter().any(|r| r.attributes.get("phoenix_pipeline_label").map(String::as_str) == Some("optimised") && r.value == 2.0));
    }

    #[test]
    fn cadence_gates_emission() {
        let cadence = EmitCadence::new(Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(cadence.should_emit(t0));
        assert!(!cadence.should_emit(t0 + Duration::from_secs(1)));
        assert!(cadence.should_emit(t0 + Duration::from_secs(61)));
    }

    #[test]
    fn repeated_lookup_returns_same_instrument() {
        let reg = registry();
        reg.counter("x", &[]).add(1.0);
        reg.counter("x", &[]).add(1.0);
        assert_eq!(reg.counter("x", &[]).value(), 2.0);
    }
}

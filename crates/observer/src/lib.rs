// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Observer Aggregator (spec §4.L): periodically scrapes the three
//! pipeline telemetry endpoints via Prometheus for a cardinality-estimate
//! metric, retains the last observed value across failed scrapes, and
//! exposes a consistent snapshot to the Profile Selector.

pub mod error;
pub mod kpi;
mod scrape;

use std::sync::Arc;

use parking_lot::Mutex;
use phoenix_telemetry::registry::MetricsRegistry;
use tracing::warn;

pub use error::Error;
pub use kpi::{KpiSnapshot, KpiStore, PipelineLabel, DEGRADED_AFTER_FAILURES};
pub use scrape::{ScrapeClient, RETRY_ATTEMPTS, RETRY_INITIAL_DELAY, SCRAPE_TIMEOUT};

/// Scrapes all three pipelines once per tick and maintains the retained
/// KPI store, wiring scrape outcomes into self-metrics.
pub struct ObserverAggregator {
    client: ScrapeClient,
    store: Mutex<KpiStore>,
    metrics: Arc<MetricsRegistry>,
}

impl ObserverAggregator {
    /// Construct an aggregator scraping `prometheus_url`.
    pub fn new(prometheus_url: impl Into<String>, metrics: Arc<MetricsRegistry>) -> Result<Self, Error> {
        Ok(Self { client: ScrapeClient::new(prometheus_url)?, store: Mutex::new(KpiStore::new()), metrics })
    }

    /// Scrape all three pipelines, updating the retained store and
    /// self-metrics. A scrape failure for one pipeline never aborts the
    /// others; the function only returns an error if every pipeline
    /// failed.
    pub async fn scrape_tick(&self) -> Result<KpiSnapshot, Error> {
        let mut last_error = None;
        let mut any_succeeded = false;

        for pipeline in PipelineLabel::ALL {
            let attrs = [("phoenix_pipeline_label", pipeline.as_label_value())];
            match self.client.scrape(pipeline).await {
                Ok(value) => {
                    any_succeeded = true;
                    self.store.lock().record_success(pipeline, value);
                    self.metrics.gauge("phoenix_observer_kpi_store_value", &attrs).set(value as f64);
                    self.metrics.gauge("phoenix_observer_kpi_store_degraded", &attrs).set(0.0);
                }
                Err(e) => {
                    warn!(%pipeline, error = %e, "pipeline scrape unavailable, retaining last observed value");
                    self.metrics.counter("phoenix_observer_kpi_store_scrape_failures", &attrs).add(1.0);
                    let mut store = self.store.lock();
                    store.record_failure(pipeline);
                    if store.is_degraded(pipeline) {
                        self.metrics.gauge("phoenix_observer_kpi_store_degraded", &attrs).set(1.0);
                    }
                    drop(store);
                    last_error = Some(e);
                }
            }
        }

        if !any_succeeded {
            if let Some(e) = last_error {
                return Err(e);
            }
        }
        Ok(self.store.lock().snapshot())
    }

    /// The Profile Selector's query path: the most recently retained
    /// snapshot, independent of this tick's scrape outcome.
    #[must_use]
    pub fn snapshot(&self) -> KpiSnapshot {
        self.store.lock().snapshot()
    }

    /// Whether `pipeline` has accumulated [`DEGRADED_AFTER_FAILURES`] or
    /// more consecutive scrape failures.
    #[must_use]
    pub fn is_degraded(&self, pipeline: PipelineLabel) -> bool {
        self.store.lock().is_degraded(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phoenix_telemetry::registry::DefaultAttributes;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn registry() -> Arc<MetricsRegistry> {
        Arc::new(MetricsRegistry::new(
            DefaultAttributes { component: "observer".to_string(), instance_id: "i-1".to_string() },
            Duration::from_secs(10),
        ))
    }

    fn body(value: &str) -> serde_json::Value {
        serde_json::json!({"status": "success", "data": {"resultType": "vector", "result": [{"metric": {}, "value": [1.0, value]}]}})
    }

    #[tokio::test]
    async fn scrape_tick_populates_all_three_pipelines() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(200).set_body_json(body("1000"))).mount(&server).await;

        let aggregator = ObserverAggregator::new(server.uri(), registry()).expect("constructs");
        let snapshot = aggregator.scrape_tick().await.expect("scrape succeeds");
        assert_eq!(snapshot.full_ts, 1_000);
        assert_eq!(snapshot.optimized_ts, 1_000);
        assert_eq!(snapshot.experimental_ts, 1_000);
    }

    #[tokio::test(start_paused = true)]
    async fn three_consecutive_failures_mark_pipeline_degraded() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(503)).mount(&server).await;

        let aggregator = ObserverAggregator::new(server.uri(), registry()).expect("constructs");
        for _ in 0..3 {
            let _ = aggregator.scrape_tick().await;
        }
        assert!(aggregator.is_degraded(PipelineLabel::FullFidelity));
    }

    #[tokio::test]
    async fn snapshot_reflects_last_retained_values_independent_of_tick() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(200).set_body_json(body("42"))).mount(&server).await;

        let aggregator = ObserverAggregator::new(server.uri(), registry()).expect("constructs");
        aggregator.scrape_tick().await.expect("scrape succeeds");
        let snap = aggregator.snapshot();
        assert_eq!(snap.optimized_ts, 42);
    }
}

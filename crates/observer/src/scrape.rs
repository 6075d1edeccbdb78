// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Prometheus instant-query scrape client for per-pipeline cardinality
//! estimates (spec §4.L, §5 "bounded backoff before falling back to the
//! last known value").

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::error::Error;
use crate::kpi::PipelineLabel;

const MAX_IDLE_CONNECTIONS_PER_HOST: usize = 4;

/// Bound on a single scrape call, including retries (spec §5 "HTTP
/// scrapes with a 10 s timeout").
pub const SCRAPE_TIMEOUT: Duration = Duration::from_secs(10);

/// Retry attempts per scrape before giving up and falling back to the
/// retained value (spec §5 "default three attempts, 2-second initial
/// delay").
pub const RETRY_ATTEMPTS: u32 = 3;

/// Initial backoff before the first retry; doubles on each subsequent
/// attempt.
pub const RETRY_INITIAL_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    data: Option<QueryData>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    result: Vec<QueryResult>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    // `[unix_timestamp, "value_as_string"]`; Prometheus always strings the sample value.
    value: (f64, String),
}

/// Scrapes a Prometheus instant-query endpoint for the cardinality
/// estimate of one pipeline.
pub struct ScrapeClient {
    http: Client,
    prometheus_url: String,
}

impl ScrapeClient {
    /// Build a client querying `prometheus_url` (e.g.
    /// `http://prometheus:9090`), timing each attempt out per
    /// [`SCRAPE_TIMEOUT`].
    pub fn new(prometheus_url: impl Into<String>) -> Result<Self, Error> {
        let http = Client::builder()
            .timeout(SCRAPE_TIMEOUT)
            .pool_max_idle_per_host(MAX_IDLE_CONNECTIONS_PER_HOST)
            .build()
            .map_err(|e| Error::request(&e))?;
        Ok(Self { http, prometheus_url: prometheus_url.into() })
    }

    /// Query the latest cardinality estimate for `pipeline`, retrying up
    /// to [`RETRY_ATTEMPTS`] times with doubling backoff starting at
    /// [`RETRY_INITIAL_DELAY`].
    pub async fn scrape(&self, pipeline: PipelineLabel) -> Result<u64, Error> {
        let query = format!(
            "{}_phoenix_pipeline_output_cardinality_estimate{{phoenix_pipeline_label=\"{}\"}}",
            pipeline.namespace(),
            pipeline.as_label_value()
        );

        let mut delay = RETRY_INITIAL_DELAY;
        let mut last_error = None;
        for attempt in 1..=RETRY_ATTEMPTS {
            match self.scrape_once(&query).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(%pipeline, attempt, error = %e, "scrape attempt failed");
                    last_error = Some(e);
                    if attempt < RETRY_ATTEMPTS {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }
        Err(last_error.unwrap_or(Error::MalformedResponse { message: "no attempts made".to_string() }))
    }

    async fn scrape_once(&self, query: &str) -> Result<u64, Error> {
        let response = self
            .http
            .get(format!("{}/api/v1/query", self.prometheus_url))
            .query(&[("query", query)])
            .send()
            .await
            .map_err(|e| Error::request(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UnexpectedStatus { status: status.as_u16(), body });
        }

        let parsed: QueryResponse = response.json().await.map_err(|e| Error::request(&e))?;
        if parsed.status != "success" {
            return Err(Error::MalformedResponse { message: format!("query status '{}'", parsed.status) });
        }

        let result = parsed
            .data
            .and_then(|d| d.result.into_iter().next())
            .ok_or_else(|| Error::MalformedResponse { message: "empty result vector".to_string() })?;

        result.value.1.parse::<f64>().map(|v| v.max(0.0).round() as u64).map_err(|e| Error::MalformedResponse { message: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn success_body(value: &str) -> serde_json::Value {
        serde_json::json!({
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [{"metric": {}, "value": [1_700_000_000.0, value]}],
            },
        })
    }

    #[tokio::test]
    async fn successful_scrape_parses_the_sample_value() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).and(path("/api/v1/query")).respond_with(ResponseTemplate::new(200).set_body_json(success_body("12345"))).mount(&server).await;

        let client = ScrapeClient::new(server.uri()).expect("client");
        let value = client.scrape(PipelineLabel::Optimised).await.expect("scrape succeeds");
        assert_eq!(value, 12_345);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_result_is_malformed_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "success", "data": {"resultType": "vector", "result": []}})))
            .mount(&server)
            .await;

        let client = ScrapeClient::new(server.uri()).expect("client");
        let result = client.scrape(PipelineLabel::FullFidelity).await;
        assert!(matches!(result, Err(Error::MalformedResponse { .. })));
    }

    #[tokio::test]
    async fn server_error_surfaces_as_unexpected_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).and(path("/api/v1/query")).respond_with(ResponseTemplate::new(503).set_body_string("unavailable")).mount(&server).await;

        let client = ScrapeClient::new(server.uri()).expect("client");
        let result = client.scrape(PipelineLabel::Experimental).await;
        assert!(matches!(result, Err(Error::UnexpectedStatus { status: 503, .. })));
    }
}

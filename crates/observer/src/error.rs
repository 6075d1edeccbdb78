// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Error type for the Observer Aggregator's scrape client.

/// Errors raised scraping or parsing a pipeline's cardinality KPI.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The HTTP request itself failed (connect, timeout, TLS, ...).
    #[error("scrape request failed: {message}")]
    Request {
        /// Human-readable detail.
        message: String,
    },
    /// The endpoint returned a non-success HTTP status.
    #[error("scrape returned status {status}: {body}")]
    UnexpectedStatus {
        /// The response status code.
        status: u16,
        /// Response body, truncated if very large.
        body: String,
    },
    /// The response body did not parse as the expected query-result shape,
    /// or carried no samples for the requested series.
    #[error("scrape response unusable: {message}")]
    MalformedResponse {
        /// Human-readable detail.
        message: String,
    },
}

impl Error {
    /// Build an [`Error::Request`] from a [`reqwest::Error`].
    #[must_use]
    pub fn request(source: &reqwest::Error) -> Self {
        Self::Request { message: source.to_string() }
    }
}

// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Health probe endpoint (spec §6).
//!
//! - GET `/health` - process liveness and version.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::AppState;

/// All routes for the health endpoint.
pub(crate) fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy", version: state.version })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_serializes_expected_shape() {
        let body = HealthResponse { status: "healthy", version: "0.1.0" };
        let value = serde_json::to_value(&body).expect("serializes");
        assert_eq!(value["status"], "healthy");
        assert_eq!(value["version"], "0.1.0");
    }
}

// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Anomaly report ingestion (spec §6 `POST /anomaly`, §4.M).

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use phoenix_profile::AnomalyReport;
use serde::Serialize;

use crate::AppState;

/// All routes for the anomaly endpoint.
pub(crate) fn routes() -> Router<AppState> {
    Router::new().route("/anomaly", post(handle_anomaly))
}

#[derive(Serialize)]
pub(crate) struct AnomalyResponse {
    status: &'static str,
    anomaly_id: String,
}

pub(crate) async fn handle_anomaly(State(state): State<AppState>, Json(report): Json<AnomalyReport>) -> (StatusCode, Json<AnomalyResponse>) {
    let anomaly_id = report.anomaly_id.clone();
    let outcome = state.anomaly_hook.handle(&report, report.timestamp);

    if outcome.forced_switch {
        // The hook already force-switched the selector; read its resulting
        // profile back rather than assuming which one it picked, and
        // publish the artifact so external readers observe it (spec §6).
        let profile = state.selector.current_profile();
        if let Err(error) = crate::publish_current(&state, profile, "anomaly_detected".to_string(), true, report.timestamp) {
            tracing::warn!(%error, anomaly_id = %anomaly_id, "failed to publish artifact after anomaly-forced switch");
        }
    }

    (StatusCode::OK, Json(AnomalyResponse { status: "acknowledged", anomaly_id }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_serializes_expected_shape() {
        let body = AnomalyResponse { status: "acknowledged", anomaly_id: "a1".to_string() };
        let value = serde_json::to_value(&body).expect("serializes");
        assert_eq!(value["status"], "acknowledged");
        assert_eq!(value["anomaly_id"], "a1");
    }
}

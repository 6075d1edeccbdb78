// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Controller self-metrics snapshot (spec §6 `GET /metrics`).

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::AppState;

/// All routes for the metrics endpoint.
pub(crate) fn routes() -> Router<AppState> {
    Router::new().route("/metrics", get(metrics))
}

#[derive(Serialize)]
pub(crate) struct MetricsResponse {
    current_mode: phoenix_profile::Profile,
    transition_count: u64,
    stability_score: f64,
    integral_error: f64,
    last_error: f64,
    uptime_seconds: u64,
    pid_kp: f64,
    pid_ki: f64,
    pid_kd: f64,
    pid_integral_limit: f64,
}

pub(crate) async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let now = monotonic_seconds(state.started_at);
    let breaker = state.controller.get_circuit_breaker_status(now);
    let pid_state = state.controller.get_state();
    let tunings = state.controller.get_tunings();

    Json(MetricsResponse {
        current_mode: state.selector.current_profile(),
        transition_count: state.selector.transition_count(),
        stability_score: if breaker.tripped { 0.0 } else { 1.0 },
        integral_error: pid_state.integral,
        last_error: pid_state.last_error,
        uptime_seconds: state.started_at.elapsed().as_secs(),
        pid_kp: tunings.kp,
        pid_ki: tunings.ki,
        pid_kd: tunings.kd,
        pid_integral_limit: tunings.integral_limit,
    })
}

/// Seconds elapsed since `started_at`, the clock the Controller Assembly's
/// `compute` calls are driven by over this process's lifetime.
fn monotonic_seconds(started_at: std::time::Instant) -> f64 {
    started_at.elapsed().as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_serializes_with_spec_field_names() {
        let body = MetricsResponse {
            current_mode: phoenix_profile::Profile::Balanced,
            transition_count: 3,
            stability_score: 1.0,
            integral_error: 0.5,
            last_error: 0.1,
            uptime_seconds: 42,
            pid_kp: 0.5,
            pid_ki: 0.1,
            pid_kd: 0.05,
            pid_integral_limit: 10_000.0,
        };
        let value = serde_json::to_value(&body).expect("serializes");
        for field in [
            "current_mode",
            "transition_count",
            "stability_score",
            "integral_error",
            "last_error",
            "uptime_seconds",
            "pid_kp",
            "pid_ki",
            "pid_kd",
            "pid_integral_limit",
        ] {
            assert!(value.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(value["current_mode"], "balanced");
    }
}

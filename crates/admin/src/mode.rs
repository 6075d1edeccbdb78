// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Operator-forced mode switch (spec §6 `POST /mode`).

use std::str::FromStr;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::AppState;

/// All routes for the mode endpoint.
pub(crate) fn routes() -> Router<AppState> {
    Router::new().route("/mode", post(set_mode))
}

#[derive(Deserialize)]
pub(crate) struct ModeRequest {
    mode: String,
    reason: String,
}

#[derive(Serialize)]
pub(crate) struct ModeResponse {
    status: &'static str,
    mode: String,
}

#[derive(Serialize)]
pub(crate) struct ModeErrorResponse {
    error: String,
}

pub(crate) async fn set_mode(
    State(state): State<AppState>,
    Json(request): Json<ModeRequest>,
) -> Result<Json<ModeResponse>, (StatusCode, Json<ModeErrorResponse>)> {
    let profile = phoenix_profile::Profile::from_str(&request.mode)
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(ModeErrorResponse { error: e })))?;

    let now_unix = chrono::Utc::now().timestamp().max(0) as u64;
    let result = state.selector.force_profile(profile, now_unix, request.reason.clone());

    crate::publish_current(&state, result.profile, request.reason, result.changed, now_unix).map_err(|e| {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(ModeErrorResponse { error: e.to_string() }))
    })?;

    Ok(Json(ModeResponse { status: "accepted", mode: result.profile.to_string() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(phoenix_profile::Profile::from_str("unknown").is_err());
    }

    #[test]
    fn known_modes_parse() {
        assert_eq!(phoenix_profile::Profile::from_str("conservative").expect("parses"), phoenix_profile::Profile::Conservative);
        assert_eq!(phoenix_profile::Profile::from_str("aggressive").expect("parses"), phoenix_profile::Profile::Aggressive);
    }
}

// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! HTTP control surface for the control plane (spec §6): `/health`,
//! `/metrics`, `/mode` and `/anomaly`, each a thin layer over the
//! Controller Assembly, Profile Selector, Anomaly Hook, Observer
//! Aggregator and Control-Signal Publisher.

pub mod error;
mod anomaly;
mod health;
mod metrics;
mod mode;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use axum::Router;
use phoenix_observer::ObserverAggregator;
use phoenix_pid::ControllerAssembly;
use phoenix_profile::{AnomalyHook, Profile, ProfileSelector};
use phoenix_publisher::{Artifact, ArtifactThresholds, CurrentMetrics, PipelineFlags, Publisher, PublishRequest};
use std::sync::atomic::Ordering;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tracing::{debug, info};

use crate::error::Error;

/// Shared state for the admin HTTP server.
#[derive(Clone)]
struct AppState {
    controller: Arc<ControllerAssembly>,
    selector: Arc<ProfileSelector>,
    anomaly_hook: Arc<AnomalyHook>,
    publisher: Arc<Publisher>,
    observer: Arc<ObserverAggregator>,
    /// Mirrors the artifact's `pipelines.experimental_enabled` flag; this
    /// process is the only writer (spec §9 single-writer discipline).
    experimental_enabled: Arc<AtomicBool>,
    version: &'static str,
    started_at: Instant,
}

/// Build a [`PublishRequest`] from the current observed state and publish
/// it, used by both the `/mode` and `/anomaly` handlers after they move the
/// Profile Selector (spec §6: both endpoints "update the artifact").
pub(crate) fn publish_current(
    state: &AppState,
    profile: Profile,
    trigger_reason: String,
    profile_changed: bool,
    now_unix: u64,
) -> Result<Artifact, phoenix_publisher::Error> {
    let kpis = state.observer.snapshot();
    let thresholds = state.selector.thresholds();
    let request = PublishRequest {
        profile,
        trigger_reason,
        current_metrics: CurrentMetrics {
            full_ts: kpis.full_ts,
            optimized_ts: kpis.optimized_ts,
            experimental_ts: kpis.experimental_ts,
            cost_reduction_ratio: kpis.cost_reduction_ratio(),
        },
        thresholds: ArtifactThresholds {
            conservative_max_ts: thresholds.conservative_max as u64,
            aggressive_min_ts: thresholds.aggressive_min as u64,
        },
        pipelines: PipelineFlags { experimental_enabled: state.experimental_enabled.load(Ordering::Relaxed) },
        profile_changed,
    };
    state.publisher.publish(&request, now_unix)
}

/// Run the admin HTTP server until `cancel` fires.
///
/// `started_at` must be the same process-start [`Instant`] the controller's
/// `compute` loop uses, so `/metrics`' `GetCircuitBreakerStatus` query
/// observes the detector on its own clock.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    bind_address: &str,
    controller: Arc<ControllerAssembly>,
    selector: Arc<ProfileSelector>,
    anomaly_hook: Arc<AnomalyHook>,
    publisher: Arc<Publisher>,
    observer: Arc<ObserverAggregator>,
    experimental_enabled: Arc<AtomicBool>,
    started_at: Instant,
    cancel: CancellationToken,
) -> Result<(), Error> {
    let app_state = AppState {
        controller,
        selector,
        anomaly_hook,
        publisher,
        observer,
        experimental_enabled,
        version: env!("CARGO_PKG_VERSION"),
        started_at,
    };

    let app = Router::new()
        .merge(health::routes())
        .merge(metrics::routes())
        .merge(mode::routes())
        .merge(anomaly::routes())
        .layer(ServiceBuilder::new())
        .with_state(app_state);

    let addr = bind_address
        .parse::<SocketAddr>()
        .map_err(|e| Error::InvalidBindAddress { bind_address: bind_address.to_string(), details: format!("{e}") })?;

    let listener =
        TcpListener::bind(&addr).await.map_err(|e| Error::BindFailed { addr: addr.to_string(), details: format!("{e}") })?;

    info!(endpoint = %addr, "admin HTTP server listening");
    debug!(route = "/health", method = "GET", "route registered");
    debug!(route = "/metrics", method = "GET", "route registered");
    debug!(route = "/mode", method = "POST", "route registered");
    debug!(route = "/anomaly", method = "POST", "route registered");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
        })
        .await
        .map_err(|e| Error::ServerError { addr: addr.to_string(), details: format!("{e}") })
}

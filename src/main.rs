// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Phoenix: adaptive observability control plane (spec §1-§2).
//!
//! Wires the adaptive control loop (PID + oscillation detector + profile
//! selector), the configuration-patch fabric (validator + registry), the
//! top-k/rollup/priority-tagger cardinality pipeline, the process-context
//! learner, the control-signal publisher and the admin HTTP surface
//! together, then runs every background loop until signalled to stop
//! (spec §5, §6 exit codes).

use std::collections::HashSet;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use phoenix_cardinality::{Aggregation, CardinalityEngine, Priority, PriorityTagger, RollupEngine, Strategy, TopK};
use phoenix_config::{ConfigPatch, ConfigValue, Settings, Severity, Source};
use phoenix_context::ProcessContextGraph;
use phoenix_patch::{ReconfigurableProcessor, Registry, Validator};
use phoenix_pid::{ControllerAssembly, DetectorConfig};
use phoenix_profile::{AnomalyHook, ProfileSelector, Thresholds};
use phoenix_publisher::{ArtifactThresholds, CurrentMetrics, PipelineFlags, Publisher, PublishRequest};
use phoenix_telemetry::{DefaultAttributes, MetricsRegistry};

/// Scrape cadence for the Observer Aggregator. Not operator-tunable today
/// (spec §6 lists no `SCRAPE_INTERVAL_SECONDS` variable); the 10s scrape
/// timeout (spec §5) bounds a single scrape, this bounds how often a
/// round of three is attempted.
const SCRAPE_INTERVAL: Duration = Duration::from_secs(15);

/// Self-metrics emit cadence (spec §4.N `ShouldEmit`).
const METRICS_EMIT_INTERVAL: Duration = Duration::from_secs(10);

/// Consecutive publish failures after which the process exits non-zero
/// (spec §6 exit code 2: "artifact write permanently failing").
const MAX_CONSECUTIVE_PUBLISH_FAILURES: u32 = 10;

/// Adaptive observability control plane regulating process-metric
/// cardinality via closed-loop feedback.
#[derive(Parser, Debug)]
#[command(name = "phoenix", version, about)]
struct Cli {
    /// Optional policy artifact (a batch of patches) to load at start-up
    /// and re-apply whenever the file changes (spec §4.E policy reload).
    #[arg(long)]
    policy_file: Option<std::path::PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(error) => {
            error!(%error, "invalid configuration, refusing to start");
            return ExitCode::from(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            error!(%error, "failed to start the async runtime");
            return ExitCode::from(1);
        }
    };

    runtime.block_on(run(settings, cli))
}

async fn run(settings: Settings, cli: Cli) -> ExitCode {
    let metrics = Arc::new(MetricsRegistry::new(
        DefaultAttributes { component: "phoenix".to_string(), instance_id: instance_id() },
        METRICS_EMIT_INTERVAL,
    ));

    let controller = match ControllerAssembly::new(
        "adaptive_control_loop",
        settings.pid_kp,
        settings.pid_ki,
        settings.pid_kd,
        settings.target_optimized_pipeline_ts_count as f64,
        0.0,
        (settings.target_optimized_pipeline_ts_count as f64) * 10.0,
        DetectorConfig::default(),
        Some(Arc::clone(&metrics)),
    ) {
        Ok(controller) => Arc::new(controller),
        Err(error) => {
            error!(%error, "invalid PID gains or output limits, refusing to start");
            return ExitCode::from(1);
        }
    };

    let registry = Arc::new(Registry::new(Validator::new(phoenix_config::ValidatorPolicy::default())));

    let cardinality_engine = Arc::new(build_cardinality_engine());
    registry.register(Arc::clone(&cardinality_engine) as Arc<dyn ReconfigurableProcessor>);

    let context_graph = match ProcessContextGraph::new(0.85, 20) {
        Ok(graph) => Arc::new(graph),
        Err(error) => {
            error!(%error, "invalid process-context damping factor or iteration count");
            return ExitCode::from(1);
        }
    };
    registry.register(Arc::clone(&context_graph) as Arc<dyn ReconfigurableProcessor>);

    if let Some(policy_file) = &cli.policy_file {
        if let Err(error) = phoenix_patch::policy_watch::reload_from_path(&registry, policy_file) {
            warn!(%error, path = %policy_file.display(), "initial policy load failed, continuing with defaults");
        }
    }

    let observer = match phoenix_observer::ObserverAggregator::new(settings.prometheus_url.clone(), Arc::clone(&metrics)) {
        Ok(observer) => Arc::new(observer),
        Err(error) => {
            error!(%error, "failed to construct the observer aggregator");
            return ExitCode::from(1);
        }
    };

    let thresholds = Thresholds {
        conservative_max: settings.threshold_optimization_conservative_max_ts as f64,
        aggressive_min: settings.threshold_optimization_aggressive_min_ts as f64,
    };
    let now_unix = unix_now();
    let selector = Arc::new(ProfileSelector::new(
        thresholds,
        settings.hysteresis_factor,
        settings.adaptive_controller_stability_seconds,
        now_unix,
    ));
    let anomaly_hook = Arc::new(AnomalyHook::new(Arc::clone(&selector), "optimized_pipeline_cardinality"));

    let publisher = match Publisher::new(
        settings.control_signal_file.clone(),
        settings.opt_mode_template_path.clone(),
        settings.correlation_id_prefix.clone(),
        phoenix_publisher::DEFAULT_LOCK_TIMEOUT,
    ) {
        Ok(publisher) => Arc::new(publisher),
        Err(error) => {
            error!(%error, "missing or invalid control-signal template, refusing to start");
            return ExitCode::from(1);
        }
    };

    let experimental_enabled = Arc::new(AtomicBool::new(true));
    let shutdown = CancellationToken::new();
    let started_at = Instant::now();

    let _policy_watcher = cli.policy_file.as_ref().and_then(|path| {
        match phoenix_patch::policy_watch::watch_policy_file(Arc::clone(&registry), path.clone()) {
            Ok(watcher) => Some(watcher),
            Err(error) => {
                warn!(%error, path = %path.display(), "failed to start policy file watcher");
                None
            }
        }
    });

    let scrape_task = phoenix_runtime::spawn_task("observer_scrape_loop", {
        let observer = Arc::clone(&observer);
        let cancel = shutdown.clone();
        move |_token| async move {
            phoenix_runtime::run_periodic("observer_scrape_loop", SCRAPE_INTERVAL, cancel, || {
                let observer = Arc::clone(&observer);
                async move { observer.scrape_tick().await.map(|_| ()) }
            })
            .await;
            Ok::<(), std::convert::Infallible>(())
        }
    });

    let publish_failures = Arc::new(AtomicU64::new(0));
    let patch_version = Arc::new(AtomicU64::new(1));
    let control_loop_period = Duration::from_secs(settings.adaptive_controller_interval_seconds.max(1));
    let control_cancel_for_failure = shutdown.clone();
    let control_task = phoenix_runtime::spawn_task("adaptive_control_loop", {
        let observer = Arc::clone(&observer);
        let controller = Arc::clone(&controller);
        let selector = Arc::clone(&selector);
        let publisher = Arc::clone(&publisher);
        let registry = Arc::clone(&registry);
        let cardinality_engine = Arc::clone(&cardinality_engine);
        let experimental_enabled = Arc::clone(&experimental_enabled);
        let publish_failures = Arc::clone(&publish_failures);
        let patch_version = Arc::clone(&patch_version);
        let cancel = shutdown.clone();
        move |_token| async move {
            phoenix_runtime::run_periodic("adaptive_control_loop", control_loop_period, cancel, || {
                let snapshot = observer.snapshot();
                let measurement = snapshot.optimized_ts as f64;
                let now_monotonic = started_at.elapsed().as_secs_f64();
                let now_unix = unix_now();

                let pid_output = controller.compute(measurement, now_monotonic);
                propose_capacity_patch(&registry, &cardinality_engine, pid_output, &patch_version, now_unix);

                let selection = selector.tick(measurement, now_unix);
                let request = PublishRequest {
                    profile: selection.profile,
                    trigger_reason: selection.reason.clone(),
                    current_metrics: CurrentMetrics {
                        full_ts: snapshot.full_ts,
                        optimized_ts: snapshot.optimized_ts,
                        experimental_ts: snapshot.experimental_ts,
                        cost_reduction_ratio: snapshot.cost_reduction_ratio(),
                    },
                    thresholds: ArtifactThresholds {
                        conservative_max_ts: selector.thresholds().conservative_max as u64,
                        aggressive_min_ts: selector.thresholds().aggressive_min as u64,
                    },
                    pipelines: PipelineFlags {
                        experimental_enabled: experimental_enabled.load(Ordering::Relaxed),
                    },
                    profile_changed: selection.changed,
                };

                let publisher = Arc::clone(&publisher);
                let publish_failures = Arc::clone(&publish_failures);
                let control_cancel_for_failure = control_cancel_for_failure.clone();
                async move {
                    match publisher.publish(&request, now_unix) {
                        Ok(artifact) => {
                            publish_failures.store(0, Ordering::Relaxed);
                            debug!(version = artifact.config_version, profile = %artifact.optimization_profile, "published control-signal artifact");
                            Ok(())
                        }
                        Err(error) => {
                            let failures = publish_failures.fetch_add(1, Ordering::Relaxed) + 1;
                            warn!(%error, failures, "control-signal publish failed, retaining prior artifact");
                            if failures >= u64::from(MAX_CONSECUTIVE_PUBLISH_FAILURES) {
                                control_cancel_for_failure.cancel();
                            }
                            Err(error)
                        }
                    }
                }
            })
            .await;
            Ok::<(), std::convert::Infallible>(())
        }
    });

    let metrics_task = phoenix_runtime::spawn_task("self_metrics_emit_loop", {
        let metrics = Arc::clone(&metrics);
        let cancel = shutdown.clone();
        move |_token| async move {
            phoenix_runtime::run_periodic("self_metrics_emit_loop", METRICS_EMIT_INTERVAL, cancel, || {
                let metrics = Arc::clone(&metrics);
                async move {
                    if let Some(snapshot) = metrics.emit(Instant::now()) {
                        debug!(component = %snapshot.component, counters = snapshot.counters.len(), gauges = snapshot.gauges.len(), "self-metrics snapshot emitted");
                    }
                    Ok::<(), std::convert::Infallible>(())
                }
            })
            .await;
            Ok::<(), std::convert::Infallible>(())
        }
    });

    let admin_task = {
        let controller = Arc::clone(&controller);
        let selector = Arc::clone(&selector);
        let anomaly_hook = Arc::clone(&anomaly_hook);
        let publisher = Arc::clone(&publisher);
        let observer = Arc::clone(&observer);
        let experimental_enabled = Arc::clone(&experimental_enabled);
        let bind_address = settings.admin_bind_address.clone();
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            phoenix_admin::run(&bind_address, controller, selector, anomaly_hook, publisher, observer, experimental_enabled, started_at, cancel)
                .await
        })
    };

    wait_for_shutdown_signal(shutdown.clone()).await;
    shutdown.cancel();

    if let Err(error) = scrape_task.shutdown_and_join().await {
        warn!(%error, "observer scrape loop did not shut down cleanly");
    }
    if let Err(error) = metrics_task.shutdown_and_join().await {
        warn!(%error, "self-metrics emit loop did not shut down cleanly");
    }
    let control_exit = control_task.shutdown_and_join().await;
    match admin_task.await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => warn!(%error, "admin HTTP server exited with an error"),
        Err(error) => warn!(%error, "admin HTTP server task panicked"),
    }

    if control_exit.is_ok() && publish_failures.load(Ordering::Relaxed) >= u64::from(MAX_CONSECUTIVE_PUBLISH_FAILURES) {
        error!(failures = publish_failures.load(Ordering::Relaxed), "control-signal artifact write permanently failing");
        return ExitCode::from(2);
    }

    info!("phoenix control plane shut down cleanly");
    ExitCode::SUCCESS
}

/// Default cardinality pipeline: a conservative top-k capacity, hybrid
/// retention so `critical`/`high` priority resources survive even when
/// they fall out of the top-k set, and sum-aggregated rollup.
fn build_cardinality_engine() -> CardinalityEngine {
    let tagger = PriorityTagger::new(
        vec![("^critical[:-].*".to_string(), Priority::Critical), ("^db[:-].*".to_string(), Priority::High)],
        "phoenix.priority",
    )
    .expect("default priority rules are valid regexes");
    let topk = TopK::new(1_000).expect("default top-k capacity is non-zero");
    let rollup = RollupEngine::new("rollup:", Aggregation::Sum);
    let mut retained = HashSet::new();
    let _ = retained.insert(Priority::Critical);
    let _ = retained.insert(Priority::High);
    CardinalityEngine::new(tagger, topk, rollup, Strategy::Hybrid, retained)
}

/// Translate the PID kernel's raw output into a top-k capacity patch and
/// submit it through the registry (spec §2 control flow: "C also emits
/// per-parameter patches routed via E to F"). The controller's output
/// range was constructed as `[0, 10x target]`, so it maps directly onto a
/// capacity in the same units as the cardinality target.
fn propose_capacity_patch(
    registry: &Registry,
    cardinality_engine: &CardinalityEngine,
    pid_output: f64,
    patch_version: &AtomicU64,
    now: u64,
) {
    let capacity = pid_output.round().max(1.0) as i64;
    let current = cardinality_engine.status();
    if current.values.get("capacity") == Some(&ConfigValue::Int(capacity)) {
        return;
    }

    let patch = ConfigPatch {
        patch_id: format!("pid-decider-{now}-{capacity}"),
        target: phoenix_cardinality::PROCESSOR_NAME.to_string(),
        parameter_path: "capacity".to_string(),
        new_value: ConfigValue::Int(capacity),
        prev_value: None,
        reason: "adaptive control loop capacity retune".to_string(),
        severity: Severity::Normal,
        source: Source::PidDecider,
        timestamp: now,
        ttl_seconds: 0,
        version: patch_version.fetch_add(1, Ordering::Relaxed),
    };

    if let Err(error) = registry.submit(patch, now) {
        debug!(%error, "pid-decider capacity patch rejected");
    }
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn instance_id() -> String {
    format!("phoenix-{}", std::process::id())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal(shutdown: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(error) => {
            warn!(%error, "failed to install SIGTERM handler, relying on Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received Ctrl-C, shutting down"),
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        () = shutdown.cancelled() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received Ctrl-C, shutting down"),
        () = shutdown.cancelled() => {}
    }
}

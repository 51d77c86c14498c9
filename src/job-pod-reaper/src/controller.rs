use crate::model::{ResourceKind, RunResult};
use crate::reaping_logic::{collect_jobs, find_job_objects, reap, resolve_namespaces, Clock, SystemClock};
use crate::settings::Settings;
use crate::store::{ClusterStore, KubeStore};

use controller_core::{telemetry, Error, Metrics, Result};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::{sync::RwLock, time::Instant};
use tracing::*;

// Context for a reaper run
pub struct Context<S = KubeStore> {
    /// Cluster access
    pub store: S,
    /// Configuration, read once at startup
    pub settings: Settings,
    /// Time source for expiry decisions
    pub clock: Arc<dyn Clock>,
    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Prometheus metrics
    pub metrics: Metrics,
}

/// Run the reaper pipeline once: resolve namespaces, collect expired pods,
/// find their job objects and delete everything.
#[instrument(skip(ctx), fields(trace_id))]
pub async fn reap_cycle<S: ClusterStore>(ctx: &Context<S>) -> Result<RunResult> {
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", &field::display(&trace_id));
    let _timer = ctx.metrics.count_and_measure();
    let started = Instant::now();
    let now = ctx.clock.now();
    ctx.diagnostics.write().await.last_run = Some(now);

    let outcome = run_stages(ctx, now).await.map(|mut result| {
        result.duration = started.elapsed();
        result
    });

    let mut diagnostics = ctx.diagnostics.write().await;
    match &outcome {
        Ok(result) => {
            diagnostics.last_result = Some(result.clone());
            diagnostics.last_error = None;
        }
        Err(err) => {
            ctx.metrics.run_failure(err);
            diagnostics.last_result = None;
            diagnostics.last_error = Some(err.to_string());
        }
    }
    outcome
}

async fn run_stages<S: ClusterStore>(ctx: &Context<S>, now: DateTime<Utc>) -> Result<RunResult> {
    let namespaces = resolve_namespaces(&ctx.store, &ctx.settings)
        .await
        .map_err(|err| {
            error!(error = %err, "Error getting namespaces");
            err
        })?;

    let jobs = collect_jobs(&ctx.store, &namespaces, &ctx.settings, now)
        .await
        .map_err(|err| {
            error!(error = %err, "Error getting jobs");
            err
        })?;
    ctx.metrics.errors_encountered(jobs.invalid_lifetimes);
    info!(
        "Found {} expired pods in {} namespace scopes",
        jobs.candidates.len(),
        namespaces.len(),
    );

    let objects = find_job_objects(&ctx.store, &jobs.candidates, &ctx.settings)
        .await
        .map_err(|err| {
            error!(error = %err, "Error getting job objects");
            err
        })?;

    let mut result = reap(&ctx.store, &objects).await;
    result.invalid_lifetimes = jobs.invalid_lifetimes;
    for kind in ResourceKind::ALL {
        ctx.metrics.reaped(kind.as_str(), result.deleted(kind));
    }
    ctx.metrics.errors_encountered(result.errors);
    Ok(result)
}

/// Diagnostics to be exposed by the web server
#[derive(Clone, Default, Serialize)]
pub struct Diagnostics {
    pub last_run: Option<DateTime<Utc>>,
    pub last_result: Option<RunResult>,
    pub last_error: Option<String>,
}

/// State shared between the reaper loop and the web server
#[derive(Clone, Default)]
pub struct State {
    /// Diagnostics populated by the reaper
    diagnostics: Arc<RwLock<Diagnostics>>,
    /// Metrics registry
    registry: prometheus::Registry,
}

/// State wrapper around the reaper outputs for the web server
impl State {
    /// Metrics getter
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    // Create a reaper Context that can update State
    pub fn to_context<S: ClusterStore>(&self, store: S, settings: Settings) -> Result<Arc<Context<S>>> {
        #[cfg(target_os = "linux")]
        if settings.process_metrics {
            let collector = prometheus::process_collector::ProcessCollector::for_self();
            self.registry
                .register(Box::new(collector))
                .map_err(Error::MetricsError)?;
        }
        let metrics = Metrics::default()
            .register(&self.registry)
            .map_err(Error::MetricsError)?;
        Ok(Arc::new(Context {
            store,
            settings,
            clock: Arc::new(SystemClock),
            diagnostics: self.diagnostics.clone(),
            metrics,
        }))
    }
}

/// Reap every `reap_interval` until the process is stopped.
///
/// With `run_once` the first run's outcome is returned instead: deletion
/// failures turn into `Error::ReapFailed`.
pub async fn run<S: ClusterStore>(ctx: Arc<Context<S>>) -> Result<()> {
    info!(settings = ?ctx.settings, "Starting job-pod-reaper");
    loop {
        let outcome = reap_cycle(&ctx).await.and_then(|result| match result.errors {
            0 => Ok(()),
            errors => {
                let err = Error::ReapFailed(errors);
                ctx.metrics.record_failure(&err);
                Err(err)
            }
        });
        ctx.metrics.run_finished(outcome.is_err());
        if let Err(err) = &outcome {
            error!(error = %err, "Reaper run failed");
        }
        if ctx.settings.run_once {
            return outcome;
        }
        debug!(interval = ?ctx.settings.reap_interval, "Sleeping for interval");
        tokio::time::sleep(ctx.settings.reap_interval).await;
    }
}

use crate::Error;
use prometheus::{opts, Gauge, IntCounter, IntCounterVec, IntGauge, Registry};
use tokio::time::Instant;

const OBJECT_TYPES: [&str; 4] = ["pod", "service", "configmap", "secret"];

#[derive(Clone)]
pub struct Metrics {
    pub build_info: IntGauge,
    pub reaped: IntCounterVec,
    pub error: IntGauge,
    pub errors: IntCounter,
    pub failures: IntCounterVec,
    pub runs: IntCounter,
    pub run_duration: Gauge,
}

impl Default for Metrics {
    fn default() -> Self {
        let build_info = IntGauge::with_opts(
            opts!("job_pod_reaper_build_info", "Build information")
                .const_label("version", env!("CARGO_PKG_VERSION")),
        )
        .unwrap();
        let reaped = IntCounterVec::new(
            opts!(
                "job_pod_reaper_reaped_total",
                "Total number of object types reaped"
            ),
            &["type"],
        )
        .unwrap();
        let error = IntGauge::new("job_pod_reaper_error", "Indicates an error was encountered").unwrap();
        let errors = IntCounter::new("job_pod_reaper_errors_total", "Total number of errors").unwrap();
        let failures = IntCounterVec::new(
            opts!(
                "job_pod_reaper_run_failures_total",
                "Runs aborted by a fatal error"
            ),
            &["error"],
        )
        .unwrap();
        let runs = IntCounter::new("job_pod_reaper_runs_total", "Reaper runs started").unwrap();
        let run_duration = Gauge::new(
            "job_pod_reaper_run_duration_seconds",
            "Last runtime duration in seconds",
        )
        .unwrap();

        build_info.set(1);
        for ty in OBJECT_TYPES {
            reaped.with_label_values(&[ty]);
        }

        Metrics {
            build_info,
            reaped,
            error,
            errors,
            failures,
            runs,
            run_duration,
        }
    }
}

impl Metrics {
    /// Register API metrics to start tracking them.
    pub fn register(self, registry: &Registry) -> Result<Self, prometheus::Error> {
        registry.register(Box::new(self.build_info.clone()))?;
        registry.register(Box::new(self.reaped.clone()))?;
        registry.register(Box::new(self.error.clone()))?;
        registry.register(Box::new(self.errors.clone()))?;
        registry.register(Box::new(self.failures.clone()))?;
        registry.register(Box::new(self.runs.clone()))?;
        registry.register(Box::new(self.run_duration.clone()))?;
        Ok(self)
    }

    pub fn reaped(&self, object_type: &str, count: u64) {
        self.reaped.with_label_values(&[object_type]).inc_by(count);
    }

    pub fn errors_encountered(&self, count: u64) {
        self.errors.inc_by(count);
    }

    pub fn run_failure(&self, e: &Error) {
        self.errors.inc();
        self.record_failure(e);
    }

    /// Label a failed run without counting another error, for failures whose
    /// errors were already counted one by one
    pub fn record_failure(&self, e: &Error) {
        self.failures.with_label_values(&[e.metric_label()]).inc();
    }

    pub fn run_finished(&self, errored: bool) {
        self.error.set(i64::from(errored));
    }

    pub fn count_and_measure(&self) -> RunMeasurer {
        self.runs.inc();
        RunMeasurer {
            start: Instant::now(),
            metric: self.run_duration.clone(),
        }
    }
}

/// Smart function duration measurer
///
/// Relies on Drop to calculate duration and set the last run duration gauge
pub struct RunMeasurer {
    start: Instant,
    metric: Gauge,
}

impl Drop for RunMeasurer {
    fn drop(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let duration = self.start.elapsed().as_millis() as f64 / 1000.0;
        self.metric.set(duration);
    }
}

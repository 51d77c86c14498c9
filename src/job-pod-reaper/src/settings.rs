use controller_core::telemetry::LogFormat;

use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

pub const LIFETIME_ANNOTATION: &str = "pod.kubernetes.io/lifetime";
pub const ALL_NAMESPACES: &str = "all";

/// Timestamp a pod's current lifetime is measured from
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LifetimeReference {
    /// `metadata.creationTimestamp`
    #[default]
    Creation,
    /// `status.startTime`, pods that have not started are never reaped
    StartTime,
}

/// Reaper configuration, read once at startup and handed to every component
#[derive(Parser, Clone, Debug)]
#[command(name = "job-pod-reaper", version, about = "Reap expired job pods and their objects")]
pub struct Settings {
    /// Run once then exit, ie executed with cron
    #[arg(long, env = "RUN_ONCE")]
    pub run_once: bool,

    /// Maximum pods to reap in each run, 0 disables the limit
    #[arg(long, env = "REAP_MAX", default_value_t = 30)]
    pub reap_max: usize,

    /// Duration between reaper runs
    #[arg(long, env = "REAP_INTERVAL", default_value = "60s", value_parser = humantime::parse_duration)]
    pub reap_interval: Duration,

    /// Namespaces to reap, ignored if --namespace-labels is set
    #[arg(long, env = "REAP_NAMESPACES", default_value = ALL_NAMESPACES, value_delimiter = ',')]
    pub reap_namespaces: Vec<String>,

    /// Label selectors used to find namespaces, each selector is queried separately
    #[arg(long, env = "NAMESPACE_LABELS", value_delimiter = ',')]
    pub namespace_labels: Vec<String>,

    /// Label selectors used to find pods, each selector is queried separately
    #[arg(long, env = "PODS_LABELS", value_delimiter = ',')]
    pub pods_labels: Vec<String>,

    /// Label associating a pod with the other objects of its job
    #[arg(long, env = "JOB_LABEL", default_value = "job")]
    pub job_label: String,

    /// Annotation declaring a pod's lifetime
    #[arg(long, env = "LIFETIME_ANNOTATION", default_value = LIFETIME_ANNOTATION)]
    pub lifetime_annotation: String,

    /// Timestamp the lifetime is measured from
    #[arg(long, env = "LIFETIME_FROM", value_enum, default_value_t = LifetimeReference::Creation)]
    pub lifetime_from: LifetimeReference,

    /// Also reap evicted pods that are still within their lifetime
    #[arg(long, env = "REAP_EVICTED_PODS")]
    pub reap_evicted_pods: bool,

    /// Path to kubeconfig when running outside the cluster
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Address to listen for HTTP requests
    #[arg(long, env = "LISTEN_ADDRESS", default_value = "0.0.0.0:8080")]
    pub listen_address: String,

    /// Collect metrics about the running process such as CPU and memory
    #[arg(long, env = "PROCESS_METRICS", default_value_t = true, action = ArgAction::Set)]
    pub process_metrics: bool,

    /// Log filter directive, RUST_LOG takes precedence
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Settings {
    /// Namespace label selectors with blank entries removed
    pub fn namespace_selectors(&self) -> Vec<&str> {
        non_blank(&self.namespace_labels)
    }

    /// Pod label selectors, an empty list selects every pod
    pub fn pod_selectors(&self) -> Vec<&str> {
        let selectors = non_blank(&self.pods_labels);
        if selectors.is_empty() {
            vec![""]
        } else {
            selectors
        }
    }
}

fn non_blank(values: &[String]) -> Vec<&str> {
    values
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect()
}

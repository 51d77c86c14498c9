use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("Failed to list {kind} in {scope} with selector {selector:?}: {source}")]
    ListFailed {
        kind: &'static str,
        scope: String,
        selector: String,
        #[source]
        source: kube::Error,
    },

    #[error("InvalidParameters: {0}")]
    InvalidParameters(String),

    #[error("{0} errors encountered during reap")]
    ReapFailed(u64),

    #[error("MetricsError: {0}")]
    MetricsError(#[source] prometheus::Error),
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kubeerror",
            Error::ListFailed { .. } => "listfailed",
            Error::InvalidParameters(_) => "invalidparameters",
            Error::ReapFailed(_) => "reapfailed",
            Error::MetricsError(_) => "metricserror",
        }
    }
}

/// Log and trace integrations
pub mod telemetry;

/// Metrics
mod metrics;
pub use metrics::{Metrics, RunMeasurer};

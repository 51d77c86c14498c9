use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Where pods are listed from
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NamespaceScope {
    /// Every namespace in the cluster
    All,
    Named(String),
}

impl fmt::Display for NamespaceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamespaceScope::All => f.write_str("all namespaces"),
            NamespaceScope::Named(name) => f.write_str(name),
        }
    }
}

/// A pod that outlived its declared lifetime (or was evicted)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReapCandidate {
    pub job_id: String,
    pub pod_name: String,
    pub namespace: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Pod,
    Service,
    ConfigMap,
    Secret,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Pod,
        ResourceKind::Service,
        ResourceKind::ConfigMap,
        ResourceKind::Secret,
    ];

    /// Value of the `type` label on the reaped counter
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Pod => "pod",
            ResourceKind::Service => "service",
            ResourceKind::ConfigMap => "configmap",
            ResourceKind::Secret => "secret",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An object slated for deletion because it belongs to an expired job.
///
/// `job_id` is never needed to delete the object, it only ties log lines
/// back to the candidate that caused the discovery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagedResource {
    pub kind: ResourceKind,
    pub job_id: String,
    pub name: String,
    pub namespace: String,
}

impl ManagedResource {
    pub fn pod(candidate: &ReapCandidate) -> Self {
        Self {
            kind: ResourceKind::Pod,
            job_id: candidate.job_id.clone(),
            name: candidate.pod_name.clone(),
            namespace: candidate.namespace.clone(),
        }
    }
}

/// Outcome of a single reap
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct RunResult {
    pub pods: u64,
    pub services: u64,
    pub config_maps: u64,
    pub secrets: u64,
    /// Deletions that failed
    pub errors: u64,
    /// Pods skipped because their lifetime annotation did not parse
    pub invalid_lifetimes: u64,
    #[serde(serialize_with = "as_seconds")]
    pub duration: Duration,
}

impl RunResult {
    pub fn record_deleted(&mut self, kind: ResourceKind) {
        *self.counter_mut(kind) += 1;
    }

    pub fn deleted(&self, kind: ResourceKind) -> u64 {
        match kind {
            ResourceKind::Pod => self.pods,
            ResourceKind::Service => self.services,
            ResourceKind::ConfigMap => self.config_maps,
            ResourceKind::Secret => self.secrets,
        }
    }

    fn counter_mut(&mut self, kind: ResourceKind) -> &mut u64 {
        match kind {
            ResourceKind::Pod => &mut self.pods,
            ResourceKind::Service => &mut self.services,
            ResourceKind::ConfigMap => &mut self.config_maps,
            ResourceKind::Secret => &mut self.secrets,
        }
    }
}

fn as_seconds<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

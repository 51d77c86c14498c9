use super::expiry::{evaluate, ExpiryPolicy, ReapReason, SkipReason, Verdict};
use crate::model::{NamespaceScope, ReapCandidate};
use crate::settings::Settings;
use crate::store::ClusterStore;
use controller_core::Result;

use chrono::{DateTime, Utc};
use kube::ResourceExt;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Candidates found in one pass plus the pods skipped for a bad annotation
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JobCollection {
    pub candidates: Vec<ReapCandidate>,
    pub invalid_lifetimes: u64,
}

/// Scan `namespaces` with every pod selector and evaluate each returned pod.
///
/// Selectors are independent queries, a pod matched by several of them is
/// evaluated once. Collection stops as soon as
/// `settings.reap_max` candidates are gathered (0 means no cap), and any
/// listing failure aborts the whole collection.
pub async fn collect_jobs<S: ClusterStore>(
    store: &S,
    namespaces: &[NamespaceScope],
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<JobCollection> {
    let policy = ExpiryPolicy::from(settings);
    let selectors = settings.pod_selectors();
    let mut collection = JobCollection::default();
    let mut seen = HashSet::new();

    for scope in namespaces {
        for &selector in &selectors {
            let pods = store.list_pods(scope, selector).await.map_err(|err| {
                warn!(namespace = %scope, label = selector, error = %err, "Error getting pod list");
                err
            })?;

            for pod in pods {
                let name = pod.name_any();
                let namespace = pod.namespace().unwrap_or_else(|| scope.to_string());
                if !seen.insert((namespace.clone(), name.clone())) {
                    continue;
                }
                match evaluate(&pod, now, &policy) {
                    Verdict::Reap { job_id, reason } => {
                        match reason {
                            ReapReason::Expired => {
                                debug!(pod = %name, %namespace, job = %job_id, "Pod is past its lifetime and will be killed")
                            }
                            ReapReason::Evicted => {
                                debug!(pod = %name, %namespace, job = %job_id, "Pod was evicted and will be killed")
                            }
                        }
                        collection.candidates.push(ReapCandidate {
                            job_id,
                            pod_name: name,
                            namespace,
                        });
                        if settings.reap_max != 0 && collection.candidates.len() >= settings.reap_max {
                            info!(max = settings.reap_max, "Max reap reached, skipping rest");
                            return Ok(collection);
                        }
                    }
                    Verdict::Skip(SkipReason::InvalidLifetime { value, error }) => {
                        warn!(pod = %name, %namespace, annotation = %value, %error, "Error parsing lifetime annotation, skipping");
                        collection.invalid_lifetimes += 1;
                    }
                    Verdict::Skip(reason) => {
                        debug!(pod = %name, %namespace, ?reason, "Skipping pod");
                    }
                }
            }
        }
    }

    Ok(collection)
}

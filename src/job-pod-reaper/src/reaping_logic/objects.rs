use crate::model::{ManagedResource, ReapCandidate, ResourceKind};
use crate::settings::Settings;
use crate::store::ClusterStore;
use controller_core::Result;

use kube::ResourceExt;
use tracing::{debug, warn};

/// Expand every candidate into its pod plus the services, config maps and
/// secrets in the same namespace labelled with the candidate's job id.
pub async fn find_job_objects<S: ClusterStore>(
    store: &S,
    candidates: &[ReapCandidate],
    settings: &Settings,
) -> Result<Vec<ManagedResource>> {
    let mut resources = Vec::new();
    for candidate in candidates {
        resources.push(ManagedResource::pod(candidate));

        let ns = candidate.namespace.as_str();
        let selector = format!("{}={}", settings.job_label, candidate.job_id);
        let found = |kind: ResourceKind, names: Vec<String>| {
            names.into_iter().map(move |name| ManagedResource {
                kind,
                job_id: candidate.job_id.clone(),
                name,
                namespace: candidate.namespace.clone(),
            })
        };

        let services = store
            .list_services(ns, &selector)
            .await
            .map_err(|err| log_lookup_failure(candidate, ResourceKind::Service, err))?;
        resources.extend(found(ResourceKind::Service, services.iter().map(|s| s.name_any()).collect()));

        let config_maps = store
            .list_config_maps(ns, &selector)
            .await
            .map_err(|err| log_lookup_failure(candidate, ResourceKind::ConfigMap, err))?;
        resources.extend(found(ResourceKind::ConfigMap, config_maps.iter().map(|c| c.name_any()).collect()));

        let secrets = store
            .list_secrets(ns, &selector)
            .await
            .map_err(|err| log_lookup_failure(candidate, ResourceKind::Secret, err))?;
        resources.extend(found(ResourceKind::Secret, secrets.iter().map(|s| s.name_any()).collect()));

        debug!(
            job = %candidate.job_id,
            namespace = ns,
            services = services.len(),
            configmaps = config_maps.len(),
            secrets = secrets.len(),
            "Found job objects",
        );
    }
    Ok(resources)
}

fn log_lookup_failure(
    candidate: &ReapCandidate,
    kind: ResourceKind,
    err: controller_core::Error,
) -> controller_core::Error {
    warn!(job = %candidate.job_id, namespace = %candidate.namespace, %kind, error = %err, "Error getting job objects");
    err
}

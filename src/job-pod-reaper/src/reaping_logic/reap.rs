use crate::model::{ManagedResource, RunResult};
use crate::store::ClusterStore;

use tracing::{error, info};

/// Delete every resource, counting successes per kind and failures.
///
/// A failed deletion is logged and skipped, it never stops the remaining ones.
pub async fn reap<S: ClusterStore>(store: &S, resources: &[ManagedResource]) -> RunResult {
    let mut result = RunResult::default();
    for resource in resources {
        match store.delete(resource).await {
            Ok(()) => {
                info!(
                    job = %resource.job_id,
                    name = %resource.name,
                    namespace = %resource.namespace,
                    kind = %resource.kind,
                    "Deleted",
                );
                result.record_deleted(resource.kind);
            }
            Err(err) => {
                error!(
                    job = %resource.job_id,
                    name = %resource.name,
                    namespace = %resource.namespace,
                    kind = %resource.kind,
                    error = %err,
                    "Error deleting",
                );
                result.errors += 1;
            }
        }
    }
    info!(
        pods = result.pods,
        services = result.services,
        configmaps = result.config_maps,
        secrets = result.secrets,
        errors = result.errors,
        "Reap summary",
    );
    result
}

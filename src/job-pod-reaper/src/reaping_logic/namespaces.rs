use crate::model::NamespaceScope;
use crate::settings::{Settings, ALL_NAMESPACES};
use crate::store::ClusterStore;
use controller_core::Result;

use itertools::Itertools;
use kube::ResourceExt;
use tracing::{debug, info, warn};

/// Turn the namespace configuration into the ordered set of scopes to scan.
///
/// Namespace label selectors win over the explicit namespace list. Each
/// selector is its own query and the results are unioned in first-seen order.
pub async fn resolve_namespaces<S: ClusterStore>(store: &S, settings: &Settings) -> Result<Vec<NamespaceScope>> {
    let selectors = settings.namespace_selectors();
    if !selectors.is_empty() {
        let mut names = Vec::new();
        for selector in selectors {
            debug!(label = selector, "Getting namespaces with label");
            let namespaces = store.list_namespaces(selector).await.map_err(|err| {
                warn!(label = selector, error = %err, "Error getting namespace list");
                err
            })?;
            debug!(label = selector, count = namespaces.len(), "Namespaces returned");
            names.extend(namespaces.iter().map(|ns| ns.name_any()));
        }
        let scopes = names
            .into_iter()
            .unique()
            .map(NamespaceScope::Named)
            .collect::<Vec<_>>();
        info!(
            "Selected {} namespaces using labels {}",
            scopes.len(),
            settings.namespace_selectors().join(","),
        );
        return Ok(scopes);
    }

    Ok(explicit_namespaces(&settings.reap_namespaces))
}

fn explicit_namespaces(configured: &[String]) -> Vec<NamespaceScope> {
    if let [only] = configured {
        if only.trim().eq_ignore_ascii_case(ALL_NAMESPACES) {
            return vec![NamespaceScope::All];
        }
    }
    configured
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .unique()
        .map(|name| NamespaceScope::Named(name.to_string()))
        .collect()
}

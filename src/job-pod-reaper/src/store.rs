use crate::model::{ManagedResource, NamespaceScope, ResourceKind};
use crate::settings::Settings;
use controller_core::{Error, Result};

use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Pod, Secret, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{Api, DeleteParams, ListParams},
    client::Client,
    config::{Config, KubeConfigOptions, Kubeconfig},
    Resource,
};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::info;

/// The cluster operations the reaper depends on.
///
/// An empty `selector` lists every object in scope.
#[allow(async_fn_in_trait)]
pub trait ClusterStore {
    async fn list_namespaces(&self, selector: &str) -> Result<Vec<Namespace>>;
    async fn list_pods(&self, scope: &NamespaceScope, selector: &str) -> Result<Vec<Pod>>;
    async fn list_services(&self, namespace: &str, selector: &str) -> Result<Vec<Service>>;
    async fn list_config_maps(&self, namespace: &str, selector: &str) -> Result<Vec<ConfigMap>>;
    async fn list_secrets(&self, namespace: &str, selector: &str) -> Result<Vec<Secret>>;
    async fn delete(&self, resource: &ManagedResource) -> Result<()>;
}

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using `--kubeconfig` when given, otherwise infer the config
    /// (in-cluster service account or the local kubeconfig).
    pub async fn try_from_settings(settings: &Settings) -> Result<Self> {
        let client = match &settings.kubeconfig {
            Some(path) => {
                info!(kubeconfig = %path.display(), "Loading kubeconfig");
                let kubeconfig = Kubeconfig::read_from(path)
                    .map_err(|e| Error::InvalidParameters(format!("unreadable kubeconfig: {e}")))?;
                let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| Error::InvalidParameters(format!("invalid kubeconfig: {e}")))?;
                Client::try_from(config).map_err(Error::KubeError)?
            }
            None => {
                info!("Inferring kubeconfig from the environment");
                Client::try_default().await.map_err(Error::KubeError)?
            }
        };
        Ok(Self::new(client))
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

async fn list_resources<K>(
    api: Api<K>,
    kind: &'static str,
    scope: String,
    selector: &str,
) -> Result<Vec<K>>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    let mut params = ListParams::default();
    if !selector.is_empty() {
        params = params.labels(selector);
    }
    api.list(&params)
        .await
        .map(|list| list.items)
        .map_err(|source| Error::ListFailed {
            kind,
            scope,
            selector: selector.to_string(),
            source,
        })
}

async fn delete_resource<K>(api: Api<K>, name: &str) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    api.delete(name, &DeleteParams::default())
        .await
        .map(|_| ())
        .map_err(Error::KubeError)
}

impl ClusterStore for KubeStore {
    async fn list_namespaces(&self, selector: &str) -> Result<Vec<Namespace>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        list_resources(api, "namespaces", "cluster".to_string(), selector).await
    }

    async fn list_pods(&self, scope: &NamespaceScope, selector: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = match scope {
            NamespaceScope::All => Api::all(self.client.clone()),
            NamespaceScope::Named(namespace) => self.namespaced(namespace),
        };
        list_resources(api, "pods", scope.to_string(), selector).await
    }

    async fn list_services(&self, namespace: &str, selector: &str) -> Result<Vec<Service>> {
        list_resources(self.namespaced(namespace), "services", namespace.to_string(), selector).await
    }

    async fn list_config_maps(&self, namespace: &str, selector: &str) -> Result<Vec<ConfigMap>> {
        list_resources(self.namespaced(namespace), "configmaps", namespace.to_string(), selector).await
    }

    async fn list_secrets(&self, namespace: &str, selector: &str) -> Result<Vec<Secret>> {
        list_resources(self.namespaced(namespace), "secrets", namespace.to_string(), selector).await
    }

    async fn delete(&self, resource: &ManagedResource) -> Result<()> {
        let ns = resource.namespace.as_str();
        let name = resource.name.as_str();
        match resource.kind {
            ResourceKind::Pod => delete_resource(self.namespaced::<Pod>(ns), name).await,
            ResourceKind::Service => delete_resource(self.namespaced::<Service>(ns), name).await,
            ResourceKind::ConfigMap => delete_resource(self.namespaced::<ConfigMap>(ns), name).await,
            ResourceKind::Secret => delete_resource(self.namespaced::<Secret>(ns), name).await,
        }
    }
}

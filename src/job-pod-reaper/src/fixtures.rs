//! Helper methods only available for tests
use crate::controller::{Context, Diagnostics};
use crate::model::{ManagedResource, NamespaceScope};
use crate::reaping_logic::Clock;
use crate::settings::{LifetimeReference, Settings, ALL_NAMESPACES, LIFETIME_ANNOTATION};
use crate::store::{ClusterStore, KubeStore};
use controller_core::{Error, Metrics, Result};

use chrono::{DateTime, Utc};
use http::{Request, Response};
use hyper::Body;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Pod, PodStatus, Secret, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::{core::ErrorResponse, Client, ResourceExt};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn utc(timestamp: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(timestamp)
        .expect("valid rfc3339 timestamp")
        .with_timezone(&Utc)
}

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Settings {
    /// Defaults as documented on the flags, without reading the process env
    pub fn test() -> Self {
        Settings {
            run_once: false,
            reap_max: 30,
            reap_interval: Duration::from_secs(60),
            reap_namespaces: vec![ALL_NAMESPACES.to_string()],
            namespace_labels: vec![],
            pods_labels: vec![],
            job_label: "job".to_string(),
            lifetime_annotation: LIFETIME_ANNOTATION.to_string(),
            lifetime_from: LifetimeReference::Creation,
            reap_evicted_pods: false,
            kubeconfig: None,
            listen_address: "127.0.0.1:0".to_string(),
            process_metrics: false,
            log_level: "debug".to_string(),
            log_format: Default::default(),
        }
    }
}

impl<S: ClusterStore> Context<S> {
    pub fn test(store: S, settings: Settings, now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Context {
            store,
            settings,
            clock: Arc::new(FixedClock(now)),
            diagnostics: Arc::new(tokio::sync::RwLock::new(Diagnostics::default())),
            metrics: Metrics::default(),
        })
    }
}

fn meta(name: &str, namespace: Option<&str>, labels: &[(&str, &str)]) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        labels: Some(
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ),
        ..ObjectMeta::default()
    }
}

pub fn namespace(name: &str, labels: &[(&str, &str)]) -> Namespace {
    Namespace {
        metadata: meta(name, None, labels),
        ..Namespace::default()
    }
}

pub fn service(name: &str, namespace: &str, labels: &[(&str, &str)]) -> Service {
    Service {
        metadata: meta(name, Some(namespace), labels),
        ..Service::default()
    }
}

pub fn config_map(name: &str, namespace: &str, labels: &[(&str, &str)]) -> ConfigMap {
    ConfigMap {
        metadata: meta(name, Some(namespace), labels),
        ..ConfigMap::default()
    }
}

pub fn secret(name: &str, namespace: &str, labels: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: meta(name, Some(namespace), labels),
        ..Secret::default()
    }
}

pub fn pod(name: &str, namespace: &str) -> PodBuilder {
    PodBuilder {
        pod: Pod {
            metadata: meta(name, Some(namespace), &[]),
            ..Pod::default()
        },
    }
}

pub struct PodBuilder {
    pod: Pod,
}

impl PodBuilder {
    pub fn lifetime(mut self, value: &str) -> Self {
        self.pod
            .annotations_mut()
            .insert(LIFETIME_ANNOTATION.to_string(), value.to_string());
        self
    }

    pub fn job(self, id: &str) -> Self {
        self.label("job", id)
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.pod.labels_mut().insert(key.to_string(), value.to_string());
        self
    }

    pub fn created(mut self, at: DateTime<Utc>) -> Self {
        self.pod.metadata.creation_timestamp = Some(Time(at));
        self
    }

    pub fn started(mut self, at: DateTime<Utc>) -> Self {
        self.status().start_time = Some(Time(at));
        self
    }

    pub fn reason(mut self, reason: &str) -> Self {
        self.status().reason = Some(reason.to_string());
        self
    }

    fn status(&mut self) -> &mut PodStatus {
        self.pod.status.get_or_insert_with(PodStatus::default)
    }

    pub fn build(self) -> Pod {
        self.pod
    }
}

/// The cluster used by the open-ondemand run tests: three user namespaces,
/// three job pods and the objects of jobs 1 and 2.
pub fn ondemand_cluster() -> FakeStore {
    let started = utc("2020-01-01T13:00:00Z");
    let ood = ("app.kubernetes.io/managed-by", "open-ondemand");
    FakeStore::default()
        .with_namespaces(vec![
            namespace("non-job", &[]),
            namespace("user-user1", &[("app.kubernetes.io/name", "open-ondemand")]),
            namespace("user-user2", &[("app.kubernetes.io/name", "foo")]),
            namespace("user-user3", &[("app.kubernetes.io/name", "open-ondemand-test")]),
        ])
        .with_pods(vec![
            pod("non-job-pod", "non-job").build(),
            pod("ondemand-job1", "user-user1")
                .lifetime("1h")
                .job("1")
                .label(ood.0, ood.1)
                .created(started)
                .started(started)
                .build(),
            pod("ondemand-job2", "user-user2")
                .lifetime("30m")
                .job("2")
                .label(ood.0, ood.1)
                .created(started)
                .started(started)
                .build(),
            pod("ondemand-job3", "user-user3")
                .lifetime("30m")
                .job("3")
                .label(ood.0, ood.1)
                .created(started)
                .build(),
        ])
        .with_services(vec![
            service("service-job1", "user-user1", &[("job", "1")]),
            service("service-job2", "user-user2", &[("job", "2")]),
        ])
        .with_config_maps(vec![
            config_map("configmap-job1", "user-user1", &[("job", "1")]),
            config_map("configmap-job2", "user-user2", &[("job", "2")]),
        ])
        .with_secrets(vec![
            secret("secret-job1", "user-user1", &[("job", "1")]),
            secret("secret-job2", "user-user2", &[("job", "2")]),
        ])
}

/// In-memory cluster answering label selectors of the `k=v`, `k!=v`, `k`
/// and `!k` forms.
#[derive(Default)]
pub struct FakeStore {
    namespaces: Vec<Namespace>,
    pods: Vec<Pod>,
    services: Vec<Service>,
    config_maps: Vec<ConfigMap>,
    secrets: Vec<Secret>,
    failing_namespace_selectors: HashSet<String>,
    failing_pod_namespaces: HashSet<String>,
    failing_service_namespaces: HashSet<String>,
    failing_config_map_namespaces: HashSet<String>,
    failing_secret_namespaces: HashSet<String>,
    failing_deletes: HashSet<String>,
    pod_lists: Mutex<usize>,
    deleted: Mutex<Vec<ManagedResource>>,
}

impl FakeStore {
    pub fn with_namespaces(mut self, namespaces: Vec<Namespace>) -> Self {
        self.namespaces.extend(namespaces);
        self
    }

    pub fn with_pods(mut self, pods: Vec<Pod>) -> Self {
        self.pods.extend(pods);
        self
    }

    pub fn with_services(mut self, services: Vec<Service>) -> Self {
        self.services.extend(services);
        self
    }

    pub fn with_config_maps(mut self, config_maps: Vec<ConfigMap>) -> Self {
        self.config_maps.extend(config_maps);
        self
    }

    pub fn with_secrets(mut self, secrets: Vec<Secret>) -> Self {
        self.secrets.extend(secrets);
        self
    }

    pub fn fail_namespace_list(mut self, selector: &str) -> Self {
        self.failing_namespace_selectors.insert(selector.to_string());
        self
    }

    pub fn fail_pod_list(mut self, namespace: &str) -> Self {
        self.failing_pod_namespaces.insert(namespace.to_string());
        self
    }

    pub fn fail_service_list(mut self, namespace: &str) -> Self {
        self.failing_service_namespaces.insert(namespace.to_string());
        self
    }

    pub fn fail_config_map_list(mut self, namespace: &str) -> Self {
        self.failing_config_map_namespaces.insert(namespace.to_string());
        self
    }

    pub fn fail_secret_list(mut self, namespace: &str) -> Self {
        self.failing_secret_namespaces.insert(namespace.to_string());
        self
    }

    pub fn fail_delete(mut self, name: &str) -> Self {
        self.failing_deletes.insert(name.to_string());
        self
    }

    /// Successful deletions, in call order
    pub fn deleted(&self) -> Vec<ManagedResource> {
        self.deleted.lock().unwrap().clone()
    }

    /// Number of pod list calls so far
    pub fn pod_lists(&self) -> usize {
        *self.pod_lists.lock().unwrap()
    }
}

fn api_error(message: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "InternalError".to_string(),
        code: 500,
    })
}

fn list_failed(kind: &'static str, scope: &str, selector: &str) -> Error {
    Error::ListFailed {
        kind,
        scope: scope.to_string(),
        selector: selector.to_string(),
        source: api_error("injected list failure"),
    }
}

fn matches_selector(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|requirement| !requirement.is_empty())
        .all(|requirement| {
            if let Some((key, value)) = requirement.split_once("!=") {
                labels.get(key.trim()).map(String::as_str) != Some(value.trim())
            } else if let Some((key, value)) = requirement.split_once('=') {
                let value = value.trim_start_matches('=');
                labels.get(key.trim()).map(String::as_str) == Some(value.trim())
            } else if let Some(key) = requirement.strip_prefix('!') {
                !labels.contains_key(key)
            } else {
                labels.contains_key(requirement)
            }
        })
}

fn select<K: ResourceExt + Clone>(objects: &[K], namespace: Option<&str>, selector: &str) -> Vec<K> {
    objects
        .iter()
        .filter(|o| namespace.map_or(true, |ns| o.namespace().as_deref() == Some(ns)))
        .filter(|o| matches_selector(o.labels(), selector))
        .cloned()
        .collect()
}

impl ClusterStore for FakeStore {
    async fn list_namespaces(&self, selector: &str) -> Result<Vec<Namespace>> {
        if self.failing_namespace_selectors.contains(selector) {
            return Err(list_failed("namespaces", "cluster", selector));
        }
        Ok(select(&self.namespaces, None, selector))
    }

    async fn list_pods(&self, scope: &NamespaceScope, selector: &str) -> Result<Vec<Pod>> {
        *self.pod_lists.lock().unwrap() += 1;
        match scope {
            NamespaceScope::All => Ok(select(&self.pods, None, selector)),
            NamespaceScope::Named(ns) if self.failing_pod_namespaces.contains(ns) => {
                Err(list_failed("pods", ns, selector))
            }
            NamespaceScope::Named(ns) => Ok(select(&self.pods, Some(ns), selector)),
        }
    }

    async fn list_services(&self, namespace: &str, selector: &str) -> Result<Vec<Service>> {
        if self.failing_service_namespaces.contains(namespace) {
            return Err(list_failed("services", namespace, selector));
        }
        Ok(select(&self.services, Some(namespace), selector))
    }

    async fn list_config_maps(&self, namespace: &str, selector: &str) -> Result<Vec<ConfigMap>> {
        if self.failing_config_map_namespaces.contains(namespace) {
            return Err(list_failed("configmaps", namespace, selector));
        }
        Ok(select(&self.config_maps, Some(namespace), selector))
    }

    async fn list_secrets(&self, namespace: &str, selector: &str) -> Result<Vec<Secret>> {
        if self.failing_secret_namespaces.contains(namespace) {
            return Err(list_failed("secrets", namespace, selector));
        }
        Ok(select(&self.secrets, Some(namespace), selector))
    }

    async fn delete(&self, resource: &ManagedResource) -> Result<()> {
        if self.failing_deletes.contains(&resource.name) {
            return Err(Error::KubeError(api_error("injected delete failure")));
        }
        self.deleted.lock().unwrap().push(resource.clone());
        Ok(())
    }
}

type ApiServerHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;
pub struct ApiServerVerifier(ApiServerHandle);

/// Scenarios we test for in ApiServerVerifier
pub enum Scenario {
    /// A pod list on `path`, optionally filtered by a label selector
    PodList {
        path: String,
        selector: Option<String>,
        pods: Vec<Pod>,
    },
    /// Any request on `path` answered with a 500
    ServerError { path: String },
    /// A delete on `path` answered with a success status
    Delete { path: String },
}

pub async fn timeout_after_1s(handle: tokio::task::JoinHandle<()>) {
    tokio::time::timeout(std::time::Duration::from_secs(1), handle)
        .await
        .expect("timeout on mock apiserver")
        .expect("scenario succeeded")
}

fn label_selector(request: &Request<Body>) -> Option<String> {
    request.uri().query().and_then(|query| {
        query.split('&').find_map(|pair| {
            pair.strip_prefix("labelSelector=")
                .map(|value| value.replace("%3D", "=").replace("%2C", ","))
        })
    })
}

impl ApiServerVerifier {
    /// Tests only get to run specific scenarios that has matching handlers
    ///
    /// NB: If the test makes more calls than the scenario handles, the
    /// surplus request hangs and the test times out.
    pub fn run(self, scenario: Scenario) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            match scenario {
                Scenario::PodList { path, selector, pods } => {
                    self.handle_pod_list(path, selector, pods).await
                }
                Scenario::ServerError { path } => self.handle_server_error(path).await,
                Scenario::Delete { path } => self.handle_delete(path).await,
            }
            .expect("scenario completed without errors");
        })
    }

    async fn handle_pod_list(mut self, path: String, selector: Option<String>, pods: Vec<Pod>) -> Result<Self> {
        let (request, send) = self.0.next_request().await.expect("service not called");
        assert_eq!(request.method(), http::Method::GET);
        assert_eq!(request.uri().path(), path);
        assert_eq!(label_selector(&request), selector);

        let list = json!({
            "apiVersion": "v1",
            "kind": "PodList",
            "metadata": { "resourceVersion": "1" },
            "items": pods,
        });
        let response = serde_json::to_vec(&list).unwrap();
        send.send_response(Response::builder().body(Body::from(response)).unwrap());
        Ok(self)
    }

    async fn handle_server_error(mut self, path: String) -> Result<Self> {
        let (request, send) = self.0.next_request().await.expect("service not called");
        assert_eq!(request.uri().path(), path);

        let status = json!({
            "apiVersion": "v1",
            "kind": "Status",
            "metadata": {},
            "status": "Failure",
            "message": "etcdserver: request timed out",
            "reason": "InternalError",
            "code": 500,
        });
        let response = serde_json::to_vec(&status).unwrap();
        send.send_response(
            Response::builder()
                .status(500)
                .body(Body::from(response))
                .unwrap(),
        );
        Ok(self)
    }

    async fn handle_delete(mut self, path: String) -> Result<Self> {
        let (request, send) = self.0.next_request().await.expect("service not called");
        assert_eq!(request.method(), http::Method::DELETE);
        assert_eq!(request.uri().path(), path);
        let req_body = hyper::body::to_bytes(request.into_body()).await.unwrap();
        let delete_options: serde_json::Value =
            serde_json::from_slice(&req_body).expect("delete options from runtime");
        assert!(delete_options.is_object());

        let status = json!({
            "apiVersion": "v1",
            "kind": "Status",
            "metadata": {},
            "status": "Success",
            "code": 200,
        });
        let response = serde_json::to_vec(&status).unwrap();
        send.send_response(Response::builder().body(Body::from(response)).unwrap());
        Ok(self)
    }
}

impl KubeStore {
    // Create a store backed by a mock apiserver
    pub fn test() -> (Self, ApiServerVerifier) {
        let (mock_service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        let mock_client = Client::new(mock_service, "default");
        (KubeStore::new(mock_client), ApiServerVerifier(handle))
    }
}

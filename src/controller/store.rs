//! Cluster store access for the reconcilers
//!
//! Reconcilers talk to the API server only through [`ClusterStore`], which
//! keeps every reconcile path testable against an in-memory store. Errors
//! coming back from kube are folded into the controller taxonomy here, so
//! callers only ever match on [`Error`] predicates.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::controller::error::{Error, Result};
use crate::crd::ComputeNode;
use crate::resources::FIELD_MANAGER;

/// Namespaced name shared by a compute node and all of its owned objects
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of any namespaced object
    pub fn of<K: Resource>(obj: &K) -> Self {
        Self::new(obj.namespace().unwrap_or_default(), obj.name_any())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Read and write access to the objects a reconcile pass touches.
///
/// `get_*` returns `Ok(None)` for absent objects. `create_*` reports a
/// racing creator as [`Error::AlreadyExists`]; `update_*` reports a stale
/// write as [`Error::Conflict`].
#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn get_compute_node(&self, key: &ObjectKey) -> Result<Option<ComputeNode>>;

    /// Replace the compute node (spec and metadata)
    async fn update_compute_node(&self, cn: &ComputeNode) -> Result<ComputeNode>;

    /// Write the compute node's status subresource, guarded by its resource version
    async fn update_compute_node_status(&self, cn: &ComputeNode) -> Result<ComputeNode>;

    async fn list_pods(&self, namespace: &str, labels: &BTreeMap<String, String>)
    -> Result<Vec<Pod>>;

    async fn get_deployment(&self, key: &ObjectKey) -> Result<Option<Deployment>>;
    async fn create_deployment(&self, deployment: &Deployment) -> Result<()>;
    async fn update_deployment(&self, deployment: &Deployment) -> Result<()>;

    async fn get_service(&self, key: &ObjectKey) -> Result<Option<Service>>;
    async fn create_service(&self, service: &Service) -> Result<()>;
    async fn update_service(&self, service: &Service) -> Result<()>;

    async fn get_config_map(&self, key: &ObjectKey) -> Result<Option<ConfigMap>>;
    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<()>;
    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<()>;
}

/// Run a store call unless the pass is cancelled first
pub async fn guarded<T, F>(cancel: &CancellationToken, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = call => result,
    }
}

/// Render a label map as a label selector string
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Merge patch body for a full status write of `cn`.
///
/// Fields the status type leaves out when empty are spelled out here as
/// `[]` or `null`, since a merge patch keeps whatever a missing key held.
/// The resource version makes the write conditional: a stale copy is
/// rejected with 409.
pub fn status_patch(cn: &ComputeNode) -> Result<serde_json::Value> {
    let mut status = serde_json::to_value(&cn.status)?;
    if let Some(fields) = status.as_object_mut() {
        fields
            .entry("conditions")
            .or_insert_with(|| serde_json::json!([]));
        if let Some(lb) = fields
            .get_mut("loadBalancer")
            .and_then(serde_json::Value::as_object_mut)
        {
            lb.entry("clusterIP").or_insert(serde_json::Value::Null);
            lb.entry("ingress").or_insert_with(|| serde_json::json!([]));
        }
    }

    Ok(serde_json::json!({
        "metadata": {
            "resourceVersion": cn.metadata.resource_version,
        },
        "status": status,
    }))
}

/// [`ClusterStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get_opt<K>(&self, key: &ObjectKey) -> Result<Option<K>>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + fmt::Debug,
        <K as Resource>::DynamicType: Default,
    {
        Ok(self.api::<K>(&key.namespace).get_opt(&key.name).await?)
    }

    async fn create<K>(&self, obj: &K) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope>
            + Clone
            + Serialize
            + DeserializeOwned
            + fmt::Debug,
        <K as Resource>::DynamicType: Default,
    {
        let key = ObjectKey::of(obj);
        match self
            .api::<K>(&key.namespace)
            .create(&post_params(), obj)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => Err(classify_write(e, &key)),
        }
    }

    async fn replace<K>(&self, obj: &K) -> Result<K>
    where
        K: Resource<Scope = NamespaceResourceScope>
            + Clone
            + Serialize
            + DeserializeOwned
            + fmt::Debug,
        <K as Resource>::DynamicType: Default,
    {
        let key = ObjectKey::of(obj);
        self.api::<K>(&key.namespace)
            .replace(&key.name, &post_params(), obj)
            .await
            .map_err(|e| classify_write(e, &key))
    }
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

/// Fold 409 responses into the dedicated taxonomy variants
fn classify_write(e: kube::Error, key: &ObjectKey) -> Error {
    match &e {
        kube::Error::Api(api_err) if api_err.code == 409 => {
            if api_err.reason == "AlreadyExists" {
                Error::AlreadyExists(key.to_string())
            } else {
                Error::Conflict(key.to_string())
            }
        }
        _ => Error::KubeError(e),
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get_compute_node(&self, key: &ObjectKey) -> Result<Option<ComputeNode>> {
        self.get_opt(key).await
    }

    async fn update_compute_node(&self, cn: &ComputeNode) -> Result<ComputeNode> {
        self.replace(cn).await
    }

    async fn update_compute_node_status(&self, cn: &ComputeNode) -> Result<ComputeNode> {
        let key = ObjectKey::of(cn);
        let api: Api<ComputeNode> = self.api(&key.namespace);

        let patch = status_patch(cn)?;

        api.patch_status(
            &key.name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await
        .map_err(|e| classify_write(e, &key))
    }

    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>> {
        let api: Api<Pod> = self.api(namespace);
        let params = ListParams::default().labels(&label_selector(labels));
        Ok(api.list(&params).await?.items)
    }

    async fn get_deployment(&self, key: &ObjectKey) -> Result<Option<Deployment>> {
        self.get_opt(key).await
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<()> {
        self.create(deployment).await
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<()> {
        self.replace(deployment).await.map(|_| ())
    }

    async fn get_service(&self, key: &ObjectKey) -> Result<Option<Service>> {
        self.get_opt(key).await
    }

    async fn create_service(&self, service: &Service) -> Result<()> {
        self.create(service).await
    }

    async fn update_service(&self, service: &Service) -> Result<()> {
        self.replace(service).await.map(|_| ())
    }

    async fn get_config_map(&self, key: &ObjectKey) -> Result<Option<ConfigMap>> {
        self.get_opt(key).await
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<()> {
        self.create(config_map).await
    }

    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<()> {
        self.replace(config_map).await.map(|_| ())
    }
}

pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod resources;

pub use config::{ConfigError, OperatorConfig};
pub use controller::{
    BackoffConfig, ClusterStore, Context, Error, KubeStore, ObjectKey, Result, error_policy,
    reconcile, reconcile_pass,
};
pub use crd::{ComputeNode, ComputeNodeSpec, ComputeNodeStatus};
pub use health::{HealthState, Metrics};

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
use kube::runtime::Controller;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::resources::COMPUTE_NODE_LABEL;

/// Helper to create a namespaced or cluster-wide API based on scope.
fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Map a proxy pod back to the compute node that selected it
fn pod_owner(pod: Pod) -> Option<ObjectRef<ComputeNode>> {
    let name = pod.labels().get(COMPUTE_NODE_LABEL)?.clone();
    let r = ObjectRef::new(&name);
    Some(match pod.namespace() {
        Some(ns) => r.within(&ns),
        None => r,
    })
}

/// Run the ComputeNode controller until `shutdown` fires.
///
/// Watches ComputeNodes and everything they own; pod changes also trigger a
/// pass so that status follows pod health without waiting for the periodic
/// requeue.
pub async fn run_controller(
    client: Client,
    config: OperatorConfig,
    health_state: Option<Arc<HealthState>>,
    shutdown: CancellationToken,
) {
    let namespace = config.watch_namespace.clone();
    let scope_msg = namespace.as_deref().unwrap_or("cluster-wide");
    tracing::info!(
        "Starting controller for ComputeNode resources (scope: {})",
        scope_msg
    );

    if let Some(ref state) = health_state {
        state.set_ready(true).await;
    }

    let ns = namespace.as_deref();
    let compute_nodes: Api<ComputeNode> = scoped_api(client.clone(), ns);
    let deployments: Api<Deployment> = scoped_api(client.clone(), ns);
    let services: Api<Service> = scoped_api(client.clone(), ns);
    let configmaps: Api<ConfigMap> = scoped_api(client.clone(), ns);
    let pods: Api<Pod> = scoped_api(client.clone(), ns);

    let ctx = Arc::new(Context::new(client, config, health_state, shutdown.clone()));

    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(compute_nodes, watcher_config.clone())
        .owns(deployments, watcher_config.clone())
        .owns(services, watcher_config.clone())
        .owns(configmaps, watcher_config.clone())
        .watches(pods, watcher_config, pod_owner)
        .graceful_shutdown_on(shutdown.cancelled_owned())
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    tracing::debug!("Reconciled: {}", obj.name);
                }
                Err(e) => {
                    let is_not_found = matches!(
                        &e,
                        kube::runtime::controller::Error::ReconcilerFailed(err, _) if err.is_not_found()
                    );
                    if is_not_found {
                        tracing::debug!("Object no longer exists (likely deleted): {:?}", e);
                    } else {
                        tracing::error!("Reconciliation error: {:?}", e);
                    }
                }
            }
        })
        .await;

    tracing::info!("Controller stream ended");
}

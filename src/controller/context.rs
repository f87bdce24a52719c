use std::sync::Arc;

use kube::Client;
use tokio_util::sync::CancellationToken;

use crate::config::OperatorConfig;
use crate::controller::store::{ClusterStore, KubeStore};
use crate::health::HealthState;
use crate::resources::{ManifestBuilder, ProxyManifests};

/// Shared context for the controller
///
/// Read-only during a pass; nothing here is mutated by reconciliation.
#[derive(Clone)]
pub struct Context {
    pub store: Arc<dyn ClusterStore>,
    pub manifests: Arc<dyn ManifestBuilder>,
    pub config: OperatorConfig,
    /// Metrics sink, absent in tests
    pub health_state: Option<Arc<HealthState>>,
    /// Parent of every pass's cancellation token
    pub shutdown: CancellationToken,
}

impl Context {
    pub fn new(
        client: Client,
        config: OperatorConfig,
        health_state: Option<Arc<HealthState>>,
        shutdown: CancellationToken,
    ) -> Self {
        let manifests = ProxyManifests::new(config.proxy_container_name.clone());
        Self {
            store: Arc::new(KubeStore::new(client)),
            manifests: Arc::new(manifests),
            config,
            health_state,
            shutdown,
        }
    }

    /// Context over an arbitrary store, with the default proxy manifests
    pub fn with_store(store: Arc<dyn ClusterStore>, config: OperatorConfig) -> Self {
        let manifests = ProxyManifests::new(config.proxy_container_name.clone());
        Self {
            store,
            manifests: Arc::new(manifests),
            config,
            health_state: None,
            shutdown: CancellationToken::new(),
        }
    }
}

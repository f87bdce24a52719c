pub mod common;
pub mod configmap;
pub mod deployment;
pub mod service;

pub use common::{
    API_VERSION, COMPUTE_NODE_LABEL, FIELD_MANAGER, KIND, owned_metadata, owner_reference,
    pod_labels, standard_labels,
};

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};

use crate::controller::error::Result;
use crate::crd::ComputeNode;

/// Builds the desired owned artifacts from a ComputeNode.
///
/// Reconcilers only overlay cluster-assigned metadata onto what these
/// return; they never look inside.
pub trait ManifestBuilder: Send + Sync {
    fn build_deployment(&self, cn: &ComputeNode) -> Result<Deployment>;
    fn build_service(&self, cn: &ComputeNode) -> Result<Service>;
    fn build_config_map(&self, cn: &ComputeNode) -> Result<ConfigMap>;
}

/// Manifests for the ShardingSphere proxy
#[derive(Clone, Debug)]
pub struct ProxyManifests {
    pub container_name: String,
}

impl ProxyManifests {
    pub fn new(container_name: impl Into<String>) -> Self {
        Self {
            container_name: container_name.into(),
        }
    }
}

impl ManifestBuilder for ProxyManifests {
    fn build_deployment(&self, cn: &ComputeNode) -> Result<Deployment> {
        Ok(deployment::generate_deployment(cn, &self.container_name))
    }

    fn build_service(&self, cn: &ComputeNode) -> Result<Service> {
        Ok(service::generate_service(cn))
    }

    fn build_config_map(&self, cn: &ComputeNode) -> Result<ConfigMap> {
        configmap::generate_config_map(cn)
    }
}

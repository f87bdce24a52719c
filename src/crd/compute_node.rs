use k8s_openapi::api::core::v1::{EnvVar, LoadBalancerIngress, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ComputeNode is the Schema for the computenodes API
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "shardingsphere.apache.org",
    version = "v1alpha1",
    kind = "ComputeNode",
    plural = "computenodes",
    shortname = "cn",
    namespaced,
    status = "ComputeNodeStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Cluster-IP", "type":"string", "jsonPath":".status.loadBalancer.clusterIP"}"#,
    printcolumn = r#"{"name":"Service-Type", "type":"string", "jsonPath":".spec.serviceType"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ComputeNodeSpec {
    /// Number of proxy instances
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Selects the proxy pods belonging to this compute node
    pub selector: LabelSelector,

    /// How the proxy is exposed
    #[serde(default)]
    pub service_type: ServiceType,

    /// Ports exposed by the proxy, keyed by name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub port_bindings: Vec<PortBinding>,

    /// Proxy version, used as the image tag
    #[serde(default = "default_server_version")]
    pub server_version: String,

    /// Image repository override (tag comes from `serverVersion`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Extra environment for the proxy container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// Resource requirements for the proxy container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Configuration rendered into the proxy's ConfigMap
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

fn default_replicas() -> i32 {
    1
}

fn default_server_version() -> String {
    "5.4.1".to_string()
}

impl ComputeNodeSpec {
    /// Pod labels used to list the proxy pods
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        self.selector.match_labels.clone().unwrap_or_default()
    }
}

/// Service exposure mode
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, Default, PartialEq, Eq)]
pub enum ServiceType {
    #[default]
    ClusterIP,
    NodePort,
    LoadBalancer,
    ExternalName,
}

impl ServiceType {
    /// Whether this mode exposes ports outside the cluster-internal address space
    pub fn is_externally_exposed(&self) -> bool {
        !matches!(self, ServiceType::ClusterIP)
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceType::ClusterIP => write!(f, "ClusterIP"),
            ServiceType::NodePort => write!(f, "NodePort"),
            ServiceType::LoadBalancer => write!(f, "LoadBalancer"),
            ServiceType::ExternalName => write!(f, "ExternalName"),
        }
    }
}

/// A named port exposed by the proxy
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PortBinding {
    /// Unique within the compute node; joins with the live service port name
    pub name: String,

    pub container_port: i32,

    pub service_port: i32,

    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Node port assigned by the platform, 0 when unassigned
    #[serde(default)]
    pub node_port: i32,
}

fn default_protocol() -> String {
    "TCP".to_string()
}

/// Proxy bootstrap configuration
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapConfig {
    #[serde(default)]
    pub server_config: ServerConfig,

    /// Raw logback.xml; a default is rendered when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logback_config: Option<String>,
}

/// Contents of the proxy's server.yaml
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default)]
    pub authority: Authority,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ClusterMode>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub props: BTreeMap<String, String>,
}

/// Users and privilege provider for the proxy
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Authority {
    #[serde(default = "default_users")]
    pub users: Vec<User>,

    #[serde(default = "default_privilege_type")]
    pub privilege_type: String,
}

impl Default for Authority {
    fn default() -> Self {
        Self {
            users: default_users(),
            privilege_type: default_privilege_type(),
        }
    }
}

fn default_users() -> Vec<User> {
    vec![User {
        user: "root@%".to_string(),
        password: "root".to_string(),
    }]
}

fn default_privilege_type() -> String {
    "ALL_PERMITTED".to_string()
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user: String,
    pub password: String,
}

/// Cluster governance mode
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMode {
    /// Standalone or Cluster
    #[serde(rename = "type")]
    pub type_: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<Repository>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    #[serde(rename = "type")]
    pub type_: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub props: BTreeMap<String, String>,
}

/// Status of the ComputeNode
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComputeNodeStatus {
    #[serde(default)]
    pub phase: ComputeNodePhase,

    /// Number of pods whose proxy container is ready
    #[serde(default)]
    pub ready_instances: i32,

    /// "ready/total" summary
    #[serde(default)]
    pub ready: String,

    #[serde(default)]
    pub load_balancer: LoadBalancerStatus,

    /// Ordered, type-unique condition history
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ComputeNodeCondition>,
}

/// Overall readiness of the compute node
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, Default, PartialEq, Eq)]
pub enum ComputeNodePhase {
    Ready,
    #[default]
    NotReady,
}

impl std::fmt::Display for ComputeNodePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComputeNodePhase::Ready => write!(f, "Ready"),
            ComputeNodePhase::NotReady => write!(f, "NotReady"),
        }
    }
}

/// Addresses copied from the live service
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerStatus {
    #[serde(rename = "clusterIP", default, skip_serializing_if = "Option::is_none")]
    pub cluster_ip: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingress: Vec<LoadBalancerIngress>,
}

/// Health classification of the compute node
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub enum ConditionType {
    Unknown,
    Pending,
    Deployed,
    Initialized,
    Started,
    Ready,
    Failed,
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConditionType::Unknown => "Unknown",
            ConditionType::Pending => "Pending",
            ConditionType::Deployed => "Deployed",
            ConditionType::Initialized => "Initialized",
            ConditionType::Started => "Started",
            ConditionType::Ready => "Ready",
            ConditionType::Failed => "Failed",
        };
        f.write_str(s)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
}

/// One entry of the condition history
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComputeNodeCondition {
    #[serde(rename = "type")]
    pub type_: ConditionType,

    pub status: ConditionStatus,

    /// RFC 3339 time of the last refresh
    pub last_update_time: String,

    /// RFC 3339 time of the last status change
    pub last_transition_time: String,

    pub reason: String,

    pub message: String,
}

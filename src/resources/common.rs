//! Common utilities for Kubernetes resource generation
//!
//! Shared constants and helpers used by every manifest builder so that all
//! owned objects carry the same identity, labels and owner reference.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::crd::ComputeNode;

/// API version for the ComputeNode CRD
pub const API_VERSION: &str = "shardingsphere.apache.org/v1alpha1";

/// Kind for the ComputeNode CRD
pub const KIND: &str = "ComputeNode";

/// Operator field manager name
pub const FIELD_MANAGER: &str = "compute-node-operator";

/// Label carrying the owning compute node's name
pub const COMPUTE_NODE_LABEL: &str = "shardingsphere.apache.org/compute-node";

/// Generate an owner reference for a ComputeNode
///
/// Owned objects are garbage collected by the platform when the compute
/// node is deleted; the operator itself never deletes them.
pub fn owner_reference(cn: &ComputeNode) -> OwnerReference {
    OwnerReference {
        api_version: API_VERSION.to_string(),
        kind: KIND.to_string(),
        name: cn.name_any(),
        uid: cn.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Standard labels for all objects belonging to a ComputeNode
pub fn standard_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), name.to_string()),
        (
            "app.kubernetes.io/component".to_string(),
            "proxy".to_string(),
        ),
        (
            "app.kubernetes.io/managed-by".to_string(),
            FIELD_MANAGER.to_string(),
        ),
        (COMPUTE_NODE_LABEL.to_string(), name.to_string()),
    ])
}

/// Labels for the proxy pods: the user's selector plus the standard set.
///
/// Selector labels win so that the Deployment's template always matches its
/// own selector.
pub fn pod_labels(cn: &ComputeNode) -> BTreeMap<String, String> {
    let mut labels = standard_labels(&cn.name_any());
    labels.extend(cn.spec.selector_labels());
    labels
}

/// Object metadata shared by every owned artifact: same namespace and name as
/// the compute node, standard labels, controller owner reference.
pub fn owned_metadata(cn: &ComputeNode) -> ObjectMeta {
    ObjectMeta {
        name: Some(cn.name_any()),
        namespace: cn.namespace(),
        labels: Some(standard_labels(&cn.name_any())),
        owner_references: Some(vec![owner_reference(cn)]),
        ..Default::default()
    }
}

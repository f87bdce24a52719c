//! Node port preservation across Service rebuilds

use std::sync::Arc;

use compute_node_operator::controller::ObjectKey;
use compute_node_operator::controller::artifacts::reconcile_service;
use compute_node_operator::crd::ServiceType;
use compute_node_operator::resources::service::generate_service;
use k8s_openapi::api::core::v1::ServicePort;
use tokio_util::sync::CancellationToken;

use crate::common::*;
use crate::{context, run_pass};

fn node_port_store(bindings: &[&str]) -> (Arc<MemoryStore>, ObjectKey) {
    let store = Arc::new(MemoryStore::new());
    let mut builder =
        ComputeNodeBuilder::new("proxy", "default").with_service_type(ServiceType::NodePort);
    for (i, name) in bindings.iter().enumerate() {
        let port = 3307 + i as i32;
        builder = builder.with_binding(name, port, port);
    }
    store.put_compute_node(builder.build());
    (store, ObjectKey::new("default", "proxy"))
}

fn live_ports(store: &MemoryStore, key: &ObjectKey) -> Vec<ServicePort> {
    store
        .service(key)
        .unwrap()
        .spec
        .unwrap()
        .ports
        .unwrap_or_default()
}

fn recorded_node_ports(store: &MemoryStore, key: &ObjectKey) -> Vec<i32> {
    store
        .compute_node(key)
        .unwrap()
        .spec
        .port_bindings
        .iter()
        .map(|pb| pb.node_port)
        .collect()
}

#[tokio::test]
async fn test_allocated_node_port_is_recorded_and_kept() {
    let (store, key) = node_port_store(&["server"]);
    let ctx = context(&store);

    // Creates the Service; the platform allocates a node port
    run_pass(&ctx, &key).await.unwrap();
    assert_eq!(live_ports(&store, &key)[0].node_port, Some(FIRST_NODE_PORT));
    assert_eq!(recorded_node_ports(&store, &key), vec![0]);

    // Records the allocation on the compute node
    run_pass(&ctx, &key).await.unwrap();
    assert_eq!(recorded_node_ports(&store, &key), vec![FIRST_NODE_PORT]);
    assert_eq!(live_ports(&store, &key)[0].node_port, Some(FIRST_NODE_PORT));

    // Steady state: nothing moves, the compute node is not written again
    run_pass(&ctx, &key).await.unwrap();
    assert_eq!(recorded_node_ports(&store, &key), vec![FIRST_NODE_PORT]);
    assert_eq!(live_ports(&store, &key)[0].node_port, Some(FIRST_NODE_PORT));
    assert_eq!(store.calls("update_compute_node"), 1);
}

#[tokio::test]
async fn test_service_update_keeps_cluster_ip() {
    let (store, key) = node_port_store(&["server"]);
    let ctx = context(&store);

    run_pass(&ctx, &key).await.unwrap();
    run_pass(&ctx, &key).await.unwrap();

    let spec = store.service(&key).unwrap().spec.unwrap();
    assert_eq!(spec.cluster_ip.as_deref(), Some(ALLOCATED_CLUSTER_IP));
    assert_eq!(spec.type_.as_deref(), Some("NodePort"));
}

#[tokio::test]
async fn test_recorded_node_port_survives_spec_edit() {
    let (store, key) = node_port_store(&["server"]);
    let ctx = context(&store);
    run_pass(&ctx, &key).await.unwrap();
    run_pass(&ctx, &key).await.unwrap();

    store.edit_compute_node(&key, |cn| cn.spec.replicas = 3);
    run_pass(&ctx, &key).await.unwrap();

    assert_eq!(recorded_node_ports(&store, &key), vec![FIRST_NODE_PORT]);
    assert_eq!(live_ports(&store, &key)[0].node_port, Some(FIRST_NODE_PORT));
}

#[tokio::test]
async fn test_switch_to_cluster_ip_releases_all_node_ports() {
    let (store, key) = node_port_store(&["server", "admin"]);
    let ctx = context(&store);
    run_pass(&ctx, &key).await.unwrap();
    run_pass(&ctx, &key).await.unwrap();
    assert_eq!(
        recorded_node_ports(&store, &key),
        vec![FIRST_NODE_PORT, FIRST_NODE_PORT + 1]
    );

    store.edit_compute_node(&key, |cn| cn.spec.service_type = ServiceType::ClusterIP);
    run_pass(&ctx, &key).await.unwrap();

    assert_eq!(recorded_node_ports(&store, &key), vec![0, 0]);
    let spec = store.service(&key).unwrap().spec.unwrap();
    assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
    assert!(spec.ports.unwrap().iter().all(|p| p.node_port.is_none()));
}

#[tokio::test]
async fn test_recorded_node_port_is_requested_on_create() {
    let store = Arc::new(MemoryStore::new());
    store.put_compute_node(
        ComputeNodeBuilder::new("proxy", "default")
            .with_service_type(ServiceType::NodePort)
            .with_node_port_binding("server", 3307, 3307, 31000)
            .build(),
    );
    let key = ObjectKey::new("default", "proxy");
    let ctx = context(&store);

    run_pass(&ctx, &key).await.unwrap();

    assert_eq!(live_ports(&store, &key)[0].node_port, Some(31000));
    assert_eq!(recorded_node_ports(&store, &key), vec![31000]);
}

#[tokio::test]
async fn test_load_balancer_records_without_rewriting_ports() {
    let store = Arc::new(MemoryStore::new());
    store.put_compute_node(
        ComputeNodeBuilder::new("proxy", "default")
            .with_service_type(ServiceType::LoadBalancer)
            .with_binding("server", 3307, 3307)
            .build(),
    );
    let key = ObjectKey::new("default", "proxy");
    let ctx = context(&store);

    run_pass(&ctx, &key).await.unwrap();
    run_pass(&ctx, &key).await.unwrap();

    assert_eq!(recorded_node_ports(&store, &key), vec![FIRST_NODE_PORT]);
    assert_eq!(live_ports(&store, &key)[0].node_port, Some(FIRST_NODE_PORT));
}

#[tokio::test]
async fn test_compute_node_deleted_before_recording() {
    let store = Arc::new(MemoryStore::new());
    let cn = ComputeNodeBuilder::new("proxy", "default")
        .with_service_type(ServiceType::NodePort)
        .with_binding("server", 3307, 3307)
        .build();
    let key = ObjectKey::of(&cn);
    // The Service outlives a compute node removed after the snapshot was taken
    store.put_service(generate_service(&cn));
    let ctx = context(&store);

    reconcile_service(&ctx, &cn, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(store.calls("get_compute_node"), 1);
    assert_eq!(store.calls("update_compute_node"), 0);
    assert_eq!(store.calls("update_service"), 0);
    assert!(store.compute_node(&key).is_none());
    assert_eq!(live_ports(&store, &key)[0].node_port, Some(FIRST_NODE_PORT));
}

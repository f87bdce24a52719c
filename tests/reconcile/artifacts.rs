//! Create-or-update behavior for the Deployment, Service and ConfigMap

use std::sync::Arc;

use compute_node_operator::controller::{Error, ObjectKey};
use compute_node_operator::resources::{COMPUTE_NODE_LABEL, KIND};

use crate::common::*;
use crate::{context, run_pass};

fn seeded(replicas: i32) -> (Arc<MemoryStore>, ObjectKey) {
    let store = Arc::new(MemoryStore::new());
    store.put_compute_node(create_test_compute_node("proxy", "default", replicas));
    (store, ObjectKey::new("default", "proxy"))
}

#[tokio::test]
async fn test_first_pass_creates_all_owned_objects() {
    let (store, key) = seeded(2);
    let ctx = context(&store);

    run_pass(&ctx, &key).await.unwrap();

    let deployment = store.deployment(&key).expect("deployment created");
    let service = store.service(&key).expect("service created");
    let config_map = store.config_map(&key).expect("configmap created");

    assert_eq!(deployment.spec.as_ref().unwrap().replicas, Some(2));

    for meta in [&deployment.metadata, &service.metadata, &config_map.metadata] {
        assert_eq!(meta.name.as_deref(), Some("proxy"));
        assert_eq!(meta.namespace.as_deref(), Some("default"));
        let owners = meta.owner_references.as_ref().unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, KIND);
        assert_eq!(owners[0].uid, "test-uid-12345");
        assert_eq!(owners[0].controller, Some(true));
        assert_eq!(
            meta.labels.as_ref().unwrap().get(COMPUTE_NODE_LABEL).map(String::as_str),
            Some("proxy")
        );
    }

    assert_eq!(store.calls("create_deployment"), 1);
    assert_eq!(store.calls("create_service"), 1);
    assert_eq!(store.calls("create_config_map"), 1);
}

#[tokio::test]
async fn test_repeated_passes_converge_to_same_objects() {
    let (store, key) = seeded(1);
    let ctx = context(&store);

    run_pass(&ctx, &key).await.unwrap();
    run_pass(&ctx, &key).await.unwrap();
    let deployment = store.deployment(&key).unwrap();
    let service = store.service(&key).unwrap();
    let config_map = store.config_map(&key).unwrap();
    let spec = store.compute_node(&key).unwrap().spec;

    run_pass(&ctx, &key).await.unwrap();

    assert_eq!(store.deployment(&key).unwrap().spec, deployment.spec);
    assert_eq!(store.service(&key).unwrap().spec, service.spec);
    assert_eq!(store.config_map(&key).unwrap().data, config_map.data);
    assert_eq!(store.compute_node(&key).unwrap().spec.port_bindings, spec.port_bindings);

    // Creation only ever happened on the first pass
    assert_eq!(store.calls("create_deployment"), 1);
    assert_eq!(store.calls("create_service"), 1);
    assert_eq!(store.calls("create_config_map"), 1);
    assert_eq!(store.calls("update_deployment"), 2);
    assert_eq!(store.calls("update_compute_node"), 0);
}

#[tokio::test]
async fn test_spec_change_rolls_into_deployment() {
    let (store, key) = seeded(1);
    let ctx = context(&store);
    run_pass(&ctx, &key).await.unwrap();

    store.edit_compute_node(&key, |cn| {
        cn.spec.replicas = 4;
        cn.spec.server_version = "5.4.2".to_string();
    });
    run_pass(&ctx, &key).await.unwrap();

    let spec = store.deployment(&key).unwrap().spec.unwrap();
    assert_eq!(spec.replicas, Some(4));
    let container = &spec.template.spec.unwrap().containers[0];
    assert_eq!(
        container.image.as_deref(),
        Some("apache/shardingsphere-proxy:5.4.2")
    );
}

#[tokio::test]
async fn test_update_keeps_cluster_assigned_metadata() {
    let (store, key) = seeded(1);
    let ctx = context(&store);
    run_pass(&ctx, &key).await.unwrap();

    // Something else annotated the live config map
    let mut live = store.config_map(&key).unwrap();
    live.metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert("kept".to_string(), "yes".to_string());
    store.put_config_map(live);

    run_pass(&ctx, &key).await.unwrap();

    let cm = store.config_map(&key).unwrap();
    assert_eq!(
        cm.metadata.annotations.unwrap().get("kept").map(String::as_str),
        Some("yes")
    );
}

#[tokio::test]
async fn test_racing_create_is_tolerated() {
    let (store, key) = seeded(1);
    store.fail("create_deployment", 1, || {
        Error::AlreadyExists("default/proxy".to_string())
    });
    let ctx = context(&store);

    run_pass(&ctx, &key).await.unwrap();

    assert_eq!(store.calls("create_deployment"), 1);
    assert!(store.service(&key).is_some());
    assert!(store.config_map(&key).is_some());
}

#[tokio::test]
async fn test_config_map_renders_bootstrap() {
    let (store, key) = seeded(1);
    let ctx = context(&store);
    run_pass(&ctx, &key).await.unwrap();

    let data = store.config_map(&key).unwrap().data.unwrap();
    let server = data.get("server.yaml").unwrap();
    assert!(server.contains("root@%:root"));
    assert!(server.contains("ALL_PERMITTED"));
    assert!(data.get("logback.xml").unwrap().contains("<configuration>"));
}

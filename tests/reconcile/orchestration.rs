//! Pass-level behavior: requeue, error aggregation, cancellation

use std::sync::Arc;
use std::time::Duration;

use compute_node_operator::OperatorConfig;
use compute_node_operator::controller::{Error, ObjectKey, error_policy, reconcile};
use kube::runtime::controller::Action;

use crate::common::*;
use crate::{context, context_with, run_pass};

fn seeded() -> (Arc<MemoryStore>, ObjectKey) {
    let store = Arc::new(MemoryStore::new());
    store.put_compute_node(create_test_compute_node("proxy", "default", 1));
    (store, ObjectKey::new("default", "proxy"))
}

#[tokio::test]
async fn test_success_requeues_after_interval() {
    let (store, key) = seeded();
    let ctx = context(&store);

    let action = run_pass(&ctx, &key).await.unwrap();
    assert_eq!(action, Action::requeue(Duration::from_secs(10)));
}

#[tokio::test]
async fn test_requeue_interval_follows_config() {
    let (store, key) = seeded();
    let config = OperatorConfig {
        requeue_interval: Duration::from_secs(30),
        ..Default::default()
    };
    let ctx = context_with(&store, config);

    let action = run_pass(&ctx, &key).await.unwrap();
    assert_eq!(action, Action::requeue(Duration::from_secs(30)));
}

#[tokio::test]
async fn test_missing_compute_node_requeues_without_writes() {
    let store = Arc::new(MemoryStore::new());
    let ctx = context(&store);

    let action = run_pass(&ctx, &ObjectKey::new("default", "gone"))
        .await
        .unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(10)));
    assert_eq!(store.calls("get_deployment"), 0);
    assert_eq!(store.calls("get_service"), 0);
    assert_eq!(store.calls("get_config_map"), 0);
}

#[tokio::test]
async fn test_not_found_error_on_fetch_is_treated_as_deleted() {
    let (store, key) = seeded();
    store.fail("get_compute_node", 1, || {
        Error::NotFound("default/proxy".to_string())
    });
    let ctx = context(&store);

    let action = run_pass(&ctx, &key).await.unwrap();
    assert_eq!(action, Action::requeue(Duration::from_secs(10)));
    assert!(store.deployment(&key).is_none());
}

#[tokio::test]
async fn test_fetch_failure_is_returned() {
    let (store, key) = seeded();
    store.fail("get_compute_node", 1, || {
        Error::TransientError("apiserver unavailable".to_string())
    });
    let ctx = context(&store);

    let err = run_pass(&ctx, &key).await.unwrap_err();
    assert!(matches!(err, Error::TransientError(_)));
    assert_eq!(store.calls("get_deployment"), 0);
}

#[tokio::test]
async fn test_owned_object_failure_does_not_stop_the_others() {
    let (store, key) = seeded();
    store.fail("create_deployment", 1, || {
        Error::TransientError("quota".to_string())
    });
    let ctx = context(&store);

    let err = run_pass(&ctx, &key).await.unwrap_err();

    assert!(matches!(err, Error::TransientError(_)));
    assert!(store.deployment(&key).is_none());
    assert!(store.service(&key).is_some());
    assert!(store.config_map(&key).is_some());

    // The next pass fills the gap
    run_pass(&ctx, &key).await.unwrap();
    assert!(store.deployment(&key).is_some());
}

#[tokio::test]
async fn test_first_error_wins_when_several_fail() {
    let (store, key) = seeded();
    store.fail("get_deployment", 1, || {
        Error::TransientError("deployment".to_string())
    });
    store.fail("get_config_map", 1, || {
        Error::TransientError("configmap".to_string())
    });
    let ctx = context(&store);

    let err = run_pass(&ctx, &key).await.unwrap_err();

    match err {
        Error::TransientError(msg) => assert_eq!(msg, "deployment"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.calls("get_config_map"), 1);
    assert!(store.service(&key).is_some());
}

#[tokio::test]
async fn test_shutdown_cancels_pass() {
    let (store, key) = seeded();
    let ctx = Arc::new(context(&store));
    ctx.shutdown.cancel();

    let cn = Arc::new(store.compute_node(&key).unwrap());
    let err = reconcile(cn, ctx).await.unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(store.deployment(&key).is_none());
    assert_eq!(store.calls("get_compute_node"), 0);
}

#[tokio::test]
async fn test_error_policy_backs_off() {
    let (store, key) = seeded();
    let ctx = Arc::new(context(&store));
    let cn = Arc::new(store.compute_node(&key).unwrap());

    let retryable = error_policy(
        cn.clone(),
        &Error::TransientError("x".to_string()),
        ctx.clone(),
    );
    let permanent = error_policy(cn, &Error::InvalidConfig("x".to_string()), ctx);

    assert_ne!(retryable, permanent);
    assert_eq!(permanent, Action::requeue(Duration::from_secs(300)));
}

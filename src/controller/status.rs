//! Observed status for ComputeNode resources
//!
//! [`project_status`] derives the whole status from a fresh read of the
//! pods and the Service; [`reconcile_status`] performs that read and writes
//! the result back, retrying when a concurrent writer bumped the resource
//! version in between.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Pod, Service};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::controller::Context;
use crate::controller::condition::{PodObservation, merge_condition, rollup_pods};
use crate::controller::error::{Error, Result};
use crate::controller::store::{ObjectKey, guarded};
use crate::crd::{ComputeNode, ComputeNodePhase, ComputeNodeStatus, LoadBalancerStatus};

/// Pods that are Running, Ready, and whose proxy container is ready
pub fn count_ready_instances(pods: &[Pod], container: &str) -> i32 {
    pods.iter()
        .filter(|p| PodObservation::from_pod(p).is_serving(container))
        .count() as i32
}

/// Addresses published by the live Service
pub fn load_balancer_status(service: &Service) -> LoadBalancerStatus {
    LoadBalancerStatus {
        cluster_ip: service.spec.as_ref().and_then(|s| s.cluster_ip.clone()),
        ingress: service
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.clone())
            .unwrap_or_default(),
    }
}

/// Compute the status a compute node should publish.
///
/// The existing condition history is carried over and merged with this
/// pass's rollup; everything else is recomputed from scratch.
pub fn project_status(
    cn: &ComputeNode,
    pods: &[Pod],
    service: &Service,
    container: &str,
    now: DateTime<Utc>,
) -> ComputeNodeStatus {
    let history = cn
        .status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default();

    let conditions = match rollup_pods(pods, now) {
        Some(cond) => merge_condition(&history, cond),
        None => history,
    };

    let ready = count_ready_instances(pods, container);

    ComputeNodeStatus {
        phase: if ready > 0 {
            ComputeNodePhase::Ready
        } else {
            ComputeNodePhase::NotReady
        },
        ready_instances: ready,
        ready: format!("{}/{}", ready, cn.spec.replicas),
        load_balancer: load_balancer_status(service),
        conditions,
    }
}

/// Recompute and write the status of one compute node.
///
/// A missing Service aborts the write (the previous status stays). A
/// conflicting write re-reads everything and tries again, up to
/// `status_update_attempts` times.
pub async fn reconcile_status(
    ctx: &Context,
    key: &ObjectKey,
    cancel: &CancellationToken,
) -> Result<()> {
    let attempts = ctx.config.status_update_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let Some(mut cn) = guarded(cancel, ctx.store.get_compute_node(key)).await? else {
            debug!(compute_node = %key, "Compute node gone, skipping status");
            return Ok(());
        };

        let pods = guarded(
            cancel,
            ctx.store.list_pods(&key.namespace, &cn.spec.selector_labels()),
        )
        .await?;

        let service = guarded(cancel, ctx.store.get_service(key))
            .await?
            .ok_or_else(|| Error::NotFound(format!("service {key}")))?;

        let status = project_status(
            &cn,
            &pods,
            &service,
            &ctx.config.proxy_container_name,
            Utc::now(),
        );
        let ready = status.ready_instances;
        cn.status = Some(status);

        match guarded(cancel, ctx.store.update_compute_node_status(&cn)).await {
            Ok(_) => {
                if let Some(health) = &ctx.health_state {
                    health.metrics.set_replicas(
                        &key.namespace,
                        &key.name,
                        cn.spec.replicas as i64,
                        ready as i64,
                    );
                }
                debug!(compute_node = %key, ready, "Status updated");
                return Ok(());
            }
            Err(e) if e.is_conflict() && attempt < attempts => {
                warn!(
                    compute_node = %key,
                    attempt,
                    "Status write conflicted, retrying with a fresh copy"
                );
            }
            Err(e) => return Err(e),
        }
    }
}

//! Reconciliation entry points for ComputeNode resources
//!
//! One pass fetches the compute node, refreshes its status, then converges
//! the Deployment, Service and ConfigMap it owns. Status is best effort; the
//! owned objects are reconciled independently and the first of their errors
//! is handed back to the controller runtime.

use std::sync::Arc;
use std::time::Instant;

use kube::ResourceExt;
use kube::runtime::controller::Action;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::controller::artifacts::{reconcile_config_map, reconcile_deployment, reconcile_service};
use crate::controller::context::Context;
use crate::controller::error::{BackoffConfig, Error, Result};
use crate::controller::status::reconcile_status;
use crate::controller::store::{ObjectKey, guarded};
use crate::crd::ComputeNode;

/// Controller runtime entry point
#[instrument(skip(cn, ctx), fields(name = %cn.name_any(), namespace = %cn.namespace().unwrap_or_default()))]
pub async fn reconcile(cn: Arc<ComputeNode>, ctx: Arc<Context>) -> Result<Action> {
    let key = ObjectKey::of(cn.as_ref());
    let cancel = ctx.shutdown.child_token();
    let start = Instant::now();

    let result = reconcile_pass(&key, &ctx, &cancel).await;

    if let Some(health) = &ctx.health_state {
        match &result {
            Ok(_) => {
                health.metrics.record_reconcile(
                    &key.namespace,
                    &key.name,
                    start.elapsed().as_secs_f64(),
                );
                health.mark_reconciled();
            }
            Err(_) => health.metrics.record_error(&key.namespace, &key.name),
        }
    }

    result
}

/// One reconcile pass for the compute node identified by `key`.
///
/// Every outcome other than an error requeues after the configured
/// interval. All three owned objects are attempted even when an earlier one
/// fails.
pub async fn reconcile_pass(
    key: &ObjectKey,
    ctx: &Context,
    cancel: &CancellationToken,
) -> Result<Action> {
    let requeue = Action::requeue(ctx.config.requeue_interval);

    let cn = match guarded(cancel, ctx.store.get_compute_node(key)).await {
        Ok(Some(cn)) => cn,
        Ok(None) => {
            debug!(compute_node = %key, "ComputeNode not found, assuming deleted");
            return Ok(requeue);
        }
        Err(e) if e.is_not_found() => {
            debug!(compute_node = %key, "ComputeNode not found, assuming deleted");
            return Ok(requeue);
        }
        Err(e) => {
            error!(compute_node = %key, error = %e, "Failed to get the compute node");
            return Err(e);
        }
    };

    info!(compute_node = %key, "Reconciling ComputeNode");

    if let Err(e) = reconcile_status(ctx, key, cancel).await {
        warn!(compute_node = %key, error = %e, "Failed to reconcile status");
    }

    let mut errors: Vec<Error> = Vec::new();

    if let Err(e) = reconcile_deployment(ctx, &cn, cancel).await {
        error!(compute_node = %key, error = %e, "Failed to reconcile deployment");
        errors.push(e);
    }
    if let Err(e) = reconcile_service(ctx, &cn, cancel).await {
        error!(compute_node = %key, error = %e, "Failed to reconcile service");
        errors.push(e);
    }
    if let Err(e) = reconcile_config_map(ctx, &cn, cancel).await {
        error!(compute_node = %key, error = %e, "Failed to reconcile configmap");
        errors.push(e);
    }

    match errors.into_iter().next() {
        Some(e) => Err(e),
        None => Ok(requeue),
    }
}

/// Error policy for the controller
///
/// Retryable errors come back quickly; permanent ones wait for the slowest
/// cadence.
pub fn error_policy(cn: Arc<ComputeNode>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = cn.name_any();
    let backoff = BackoffConfig::default();
    let delay = backoff.delay_for_error(error, 0);

    if error.is_retryable() {
        warn!(
            "Retryable error for {}: {}, requeuing in {:?}",
            name, error, delay
        );
    } else {
        error!(
            "Non-retryable error for {}: {}, requeuing in {:?}",
            name, error, delay
        );
    }

    Action::requeue(delay)
}

//! Create-or-update reconcilers for the objects a ComputeNode owns
//!
//! Each owned object shares the compute node's namespace and name. A missing
//! object is built and created; an existing one is rebuilt from the compute node and
//! replaced, keeping the metadata the cluster assigned to it.

use k8s_openapi::api::core::v1::ServicePort;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::controller::Context;
use crate::controller::error::Result;
use crate::controller::ports::{adopt_node_ports, clear_node_ports, merge_node_ports};
use crate::controller::store::{ObjectKey, guarded};
use crate::crd::{ComputeNode, PortBinding, ServiceType};

/// Metadata for a replacement of `existing`.
///
/// Identity, labels, annotations and owner references are kept as stored.
/// The resource version is dropped so the store computes the successor
/// itself, and managed fields are left for the server to maintain.
pub fn adopt_metadata(existing: &ObjectMeta) -> ObjectMeta {
    ObjectMeta {
        resource_version: None,
        managed_fields: None,
        ..existing.clone()
    }
}

/// A create that lost the race against another creator still converged
fn tolerate_existing(result: Result<()>, kind: &str, key: &ObjectKey) -> Result<()> {
    match result {
        Err(e) if e.is_already_exists() => {
            debug!(%key, kind, "Already created concurrently");
            Ok(())
        }
        other => other,
    }
}

/// Converge the proxy Deployment
pub async fn reconcile_deployment(
    ctx: &Context,
    cn: &ComputeNode,
    cancel: &CancellationToken,
) -> Result<()> {
    let key = ObjectKey::of(cn);
    let mut desired = ctx.manifests.build_deployment(cn)?;

    match guarded(cancel, ctx.store.get_deployment(&key)).await? {
        None => {
            let result = guarded(cancel, ctx.store.create_deployment(&desired)).await;
            tolerate_existing(result, "Deployment", &key)?;
            info!(%key, "Created Deployment");
        }
        Some(existing) => {
            desired.metadata = adopt_metadata(&existing.metadata);
            guarded(cancel, ctx.store.update_deployment(&desired)).await?;
            debug!(%key, "Updated Deployment");
        }
    }
    Ok(())
}

/// Converge the proxy ConfigMap
pub async fn reconcile_config_map(
    ctx: &Context,
    cn: &ComputeNode,
    cancel: &CancellationToken,
) -> Result<()> {
    let key = ObjectKey::of(cn);
    let mut desired = ctx.manifests.build_config_map(cn)?;

    match guarded(cancel, ctx.store.get_config_map(&key)).await? {
        None => {
            let result = guarded(cancel, ctx.store.create_config_map(&desired)).await;
            tolerate_existing(result, "ConfigMap", &key)?;
            info!(%key, "Created ConfigMap");
        }
        Some(existing) => {
            desired.metadata = adopt_metadata(&existing.metadata);
            guarded(cancel, ctx.store.update_config_map(&desired)).await?;
            debug!(%key, "Updated ConfigMap");
        }
    }
    Ok(())
}

/// Apply the node port rules for `service_type` to `bindings`
fn sync_bindings(
    service_type: ServiceType,
    bindings: &mut [PortBinding],
    live_ports: &[ServicePort],
) -> bool {
    if service_type.is_externally_exposed() {
        adopt_node_ports(bindings, live_ports)
    } else {
        clear_node_ports(bindings)
    }
}

/// Converge the proxy Service.
///
/// Before rebuilding, the port bindings are reconciled against the live
/// allocation: ClusterIP releases recorded node ports, every other mode
/// records node ports the platform allocated. Changed bindings are written
/// back to the compute node. The rebuilt Service always keeps the live
/// cluster IPs.
pub async fn reconcile_service(
    ctx: &Context,
    cn: &ComputeNode,
    cancel: &CancellationToken,
) -> Result<()> {
    let key = ObjectKey::of(cn);

    let Some(existing) = guarded(cancel, ctx.store.get_service(&key)).await? else {
        let desired = ctx.manifests.build_service(cn)?;
        let result = guarded(cancel, ctx.store.create_service(&desired)).await;
        tolerate_existing(result, "Service", &key)?;
        info!(%key, "Created Service");
        return Ok(());
    };

    let live_spec = existing.spec.clone().unwrap_or_default();
    let live_ports = live_spec.ports.clone().unwrap_or_default();

    let mut cn = cn.clone();
    if sync_bindings(cn.spec.service_type, &mut cn.spec.port_bindings, &live_ports) {
        // The snapshot may predate this pass's status write; apply the same
        // rules to the current copy so the write carries a fresh version
        let Some(mut current) = guarded(cancel, ctx.store.get_compute_node(&key)).await? else {
            debug!(%key, "Compute node gone, skipping Service");
            return Ok(());
        };
        if sync_bindings(
            current.spec.service_type,
            &mut current.spec.port_bindings,
            &live_ports,
        ) {
            cn = guarded(cancel, ctx.store.update_compute_node(&current)).await?;
            info!(%key, service_type = %cn.spec.service_type, "Recorded node port bindings");
        } else {
            cn = current;
        }
    }

    let mut desired = ctx.manifests.build_service(&cn)?;
    desired.metadata = adopt_metadata(&existing.metadata);
    if let Some(spec) = desired.spec.as_mut() {
        spec.cluster_ip = live_spec.cluster_ip.clone();
        spec.cluster_ips = live_spec.cluster_ips.clone();
        if cn.spec.service_type == ServiceType::NodePort {
            spec.ports = Some(merge_node_ports(&cn.spec.port_bindings, &live_ports));
        }
    }

    guarded(cancel, ctx.store.update_service(&desired)).await?;
    debug!(%key, "Updated Service");
    Ok(())
}

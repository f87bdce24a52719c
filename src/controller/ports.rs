//! Node port bookkeeping between port bindings and the live Service
//!
//! The platform allocates node ports; the compute node records them in its
//! port bindings so that a rebuilt Service asks for the same numbers again.
//! Once recorded, a node port is never silently replaced.

use k8s_openapi::api::core::v1::ServicePort;

use crate::crd::PortBinding;
use crate::resources::service::service_port;

/// Release every recorded node port (switching to ClusterIP).
///
/// Returns whether any binding changed.
pub fn clear_node_ports(bindings: &mut [PortBinding]) -> bool {
    let mut changed = false;
    for pb in bindings.iter_mut().filter(|pb| pb.node_port != 0) {
        pb.node_port = 0;
        changed = true;
    }
    changed
}

/// Record node ports allocated on the live Service into bindings that have
/// none yet, joining by port name. First allocation wins.
///
/// Returns whether any binding changed.
pub fn adopt_node_ports(bindings: &mut [PortBinding], live: &[ServicePort]) -> bool {
    let mut changed = false;
    for sp in live {
        let Some(name) = sp.name.as_deref() else {
            continue;
        };
        let allocated = sp.node_port.unwrap_or(0);
        if let Some(pb) = bindings.iter_mut().find(|pb| pb.name == name) {
            if pb.node_port == 0 && allocated != 0 {
                pb.node_port = allocated;
                changed = true;
            }
        }
    }
    changed
}

/// Rebuild the Service port list for NodePort mode.
///
/// Only bindings with a live port of the same name are kept, in binding
/// order; each carries the live node port when one is allocated.
pub fn merge_node_ports(bindings: &[PortBinding], live: &[ServicePort]) -> Vec<ServicePort> {
    bindings
        .iter()
        .flat_map(|pb| {
            live.iter()
                .filter(move |sp| sp.name.as_deref() == Some(pb.name.as_str()))
                .map(move |sp| {
                    let mut port = service_port(pb);
                    if let Some(np) = sp.node_port.filter(|np| *np != 0) {
                        port.node_port = Some(np);
                    }
                    port
                })
        })
        .collect()
}

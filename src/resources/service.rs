//! Service generation for the proxy instances
//!
//! The Service shares the compute node's name and routes to the pods matched
//! by its selector. Node ports recorded in the port bindings are requested
//! whenever the exposure mode allocates them.

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::crd::{ComputeNode, PortBinding, ServiceType};
use crate::resources::common::owned_metadata;

/// Translate one port binding into a service port, without any node port
pub fn service_port(pb: &PortBinding) -> ServicePort {
    ServicePort {
        name: Some(pb.name.clone()),
        port: pb.service_port,
        target_port: Some(IntOrString::Int(pb.container_port)),
        protocol: Some(pb.protocol.clone()),
        ..Default::default()
    }
}

/// Generate the proxy Service
pub fn generate_service(cn: &ComputeNode) -> Service {
    let allocates_node_ports = matches!(
        cn.spec.service_type,
        ServiceType::NodePort | ServiceType::LoadBalancer
    );

    let ports: Vec<ServicePort> = cn
        .spec
        .port_bindings
        .iter()
        .map(|pb| {
            let mut port = service_port(pb);
            if allocates_node_ports && pb.node_port != 0 {
                port.node_port = Some(pb.node_port);
            }
            port
        })
        .collect();

    Service {
        metadata: owned_metadata(cn),
        spec: Some(ServiceSpec {
            selector: Some(cn.spec.selector_labels()),
            ports: Some(ports),
            type_: Some(cn.spec.service_type.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

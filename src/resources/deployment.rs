//! Deployment generation for the proxy instances
//!
//! Every ComputeNode runs its proxies as a single Deployment named after the
//! compute node. The proxy configuration is mounted from the ConfigMap built
//! in [`crate::resources::configmap`].

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, PodSpec, PodTemplateSpec, Probe,
    TCPSocketAction, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::crd::ComputeNode;
use crate::resources::common::{owned_metadata, pod_labels};

/// Default proxy image repository
pub const DEFAULT_IMAGE: &str = "apache/shardingsphere-proxy";

/// Directory the proxy reads server.yaml and logback.xml from
pub const CONFIG_MOUNT_PATH: &str = "/opt/shardingsphere-proxy/conf";

const CONFIG_VOLUME: &str = "proxy-config";

/// Generate the proxy Deployment
pub fn generate_deployment(cn: &ComputeNode, container_name: &str) -> Deployment {
    let labels = pod_labels(cn);

    let image = format!(
        "{}:{}",
        cn.spec.image.as_deref().unwrap_or(DEFAULT_IMAGE),
        cn.spec.server_version
    );

    let ports: Vec<ContainerPort> = cn
        .spec
        .port_bindings
        .iter()
        .map(|pb| ContainerPort {
            name: Some(pb.name.clone()),
            container_port: pb.container_port,
            protocol: Some(pb.protocol.clone()),
            ..Default::default()
        })
        .collect();

    // Probe the first bound port; proxies without ports are not probed
    let probe = cn.spec.port_bindings.first().map(|pb| Probe {
        tcp_socket: Some(TCPSocketAction {
            port: IntOrString::Int(pb.container_port),
            ..Default::default()
        }),
        initial_delay_seconds: Some(10),
        period_seconds: Some(5),
        ..Default::default()
    });

    let container = Container {
        name: container_name.to_string(),
        image: Some(image),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ports: if ports.is_empty() { None } else { Some(ports) },
        env: if cn.spec.env.is_empty() {
            None
        } else {
            Some(cn.spec.env.clone())
        },
        resources: cn.spec.resources.clone(),
        volume_mounts: Some(vec![VolumeMount {
            name: CONFIG_VOLUME.to_string(),
            mount_path: CONFIG_MOUNT_PATH.to_string(),
            ..Default::default()
        }]),
        readiness_probe: probe.clone(),
        liveness_probe: probe,
        ..Default::default()
    };

    Deployment {
        metadata: owned_metadata(cn),
        spec: Some(DeploymentSpec {
            replicas: Some(cn.spec.replicas),
            selector: cn.spec.selector.clone(),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(vec![Volume {
                        name: CONFIG_VOLUME.to_string(),
                        config_map: Some(ConfigMapVolumeSource {
                            name: cn.name_any(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

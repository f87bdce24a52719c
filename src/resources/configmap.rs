//! ConfigMap generation for the proxy configuration bundle
//!
//! Renders `server.yaml` from the bootstrap server config and ships
//! `logback.xml` verbatim (or a console-only default).

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use serde::Serialize;

use crate::controller::error::{Error, Result};
use crate::crd::{Authority, ClusterMode, ComputeNode};
use crate::resources::common::owned_metadata;

pub const SERVER_CONFIG_KEY: &str = "server.yaml";
pub const LOGBACK_CONFIG_KEY: &str = "logback.xml";

pub const DEFAULT_LOGBACK: &str = r#"<?xml version="1.0"?>
<configuration>
    <appender name="console" class="ch.qos.logback.core.ConsoleAppender">
        <encoder>
            <pattern>[%-5level] %d{yyyy-MM-dd HH:mm:ss.SSS} [%thread] %logger{36} - %msg%n</pattern>
        </encoder>
    </appender>
    <root>
        <level value="INFO" />
        <appender-ref ref="console" />
    </root>
</configuration>
"#;

/// On-disk shape of server.yaml
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerYaml<'a> {
    authority: AuthorityYaml<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mode: Option<&'a ClusterMode>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    props: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct AuthorityYaml<'a> {
    users: Vec<String>,
    privilege: PrivilegeYaml<'a>,
}

#[derive(Serialize)]
struct PrivilegeYaml<'a> {
    #[serde(rename = "type")]
    type_: &'a str,
}

impl<'a> AuthorityYaml<'a> {
    fn from_authority(authority: &'a Authority) -> Self {
        Self {
            users: authority
                .users
                .iter()
                .map(|u| format!("{}:{}", u.user, u.password))
                .collect(),
            privilege: PrivilegeYaml {
                type_: &authority.privilege_type,
            },
        }
    }
}

/// Render server.yaml for a compute node
pub fn render_server_config(cn: &ComputeNode) -> Result<String> {
    let config = &cn.spec.bootstrap.server_config;
    let yaml = ServerYaml {
        authority: AuthorityYaml::from_authority(&config.authority),
        mode: config.mode.as_ref(),
        props: &config.props,
    };
    serde_yaml::to_string(&yaml).map_err(|e| Error::MalformedError(format!("server.yaml: {e}")))
}

/// Generate the proxy ConfigMap
pub fn generate_config_map(cn: &ComputeNode) -> Result<ConfigMap> {
    let logback = cn
        .spec
        .bootstrap
        .logback_config
        .clone()
        .unwrap_or_else(|| DEFAULT_LOGBACK.to_string());

    let data = BTreeMap::from([
        (SERVER_CONFIG_KEY.to_string(), render_server_config(cn)?),
        (LOGBACK_CONFIG_KEY.to_string(), logback),
    ]);

    Ok(ConfigMap {
        metadata: owned_metadata(cn),
        data: Some(data),
        ..Default::default()
    })
}

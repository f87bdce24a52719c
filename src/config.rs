//! Operator configuration loaded from the environment

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Container whose readiness counts towards ready instances
pub const DEFAULT_PROXY_CONTAINER: &str = "shardingsphere-proxy";

/// Periodic requeue interval after a successful pass
pub const DEFAULT_REQUEUE_SECS: u64 = 10;

/// Status writes attempted before a conflict is given up on
pub const DEFAULT_STATUS_UPDATE_ATTEMPTS: u32 = 3;

pub const DEFAULT_HEALTH_ADDR: &str = "0.0.0.0:8080";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Namespace to watch; cluster-wide when `None`
    pub watch_namespace: Option<String>,
    pub requeue_interval: Duration,
    pub proxy_container_name: String,
    pub status_update_attempts: u32,
    pub health_addr: SocketAddr,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            requeue_interval: Duration::from_secs(DEFAULT_REQUEUE_SECS),
            proxy_container_name: DEFAULT_PROXY_CONTAINER.to_string(),
            status_update_attempts: DEFAULT_STATUS_UPDATE_ATTEMPTS,
            health_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl OperatorConfig {
    /// Load from process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup, unset keys take defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let watch_namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty());

        let requeue_interval = parse_opt::<u64>(&lookup, "REQUEUE_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.requeue_interval);

        let proxy_container_name = lookup("PROXY_CONTAINER_NAME")
            .filter(|n| !n.is_empty())
            .unwrap_or(defaults.proxy_container_name);

        let status_update_attempts = match parse_opt::<u32>(&lookup, "STATUS_UPDATE_ATTEMPTS")? {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    key: "STATUS_UPDATE_ATTEMPTS",
                    value: "0".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            Some(n) => n,
            None => defaults.status_update_attempts,
        };

        let health_addr =
            parse_opt::<SocketAddr>(&lookup, "HEALTH_ADDR")?.unwrap_or(defaults.health_addr);

        Ok(Self {
            watch_namespace,
            requeue_interval,
            proxy_container_name,
            status_update_attempts,
            health_addr,
        })
    }
}

fn parse_opt<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key,
                reason: e.to_string(),
                value,
            }),
    }
}

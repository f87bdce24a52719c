//! Error types for the ComputeNode controller

use std::time::Duration;

use thiserror::Error;

/// Error variants are named with the `Error` suffix where they wrap another
/// error or describe a class of failure (e.g., `KubeError`, `TransientError`).
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Conflicting write to {0}")]
    Conflict(String),

    #[error("Transient error (will retry): {0}")]
    TransientError(String),

    #[error("Malformed object: {0}")]
    MalformedError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Reconcile pass cancelled")]
    Cancelled,
}

impl Error {
    /// Check if this error indicates a resource was not found
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::KubeError(e) => api_code(e) == Some(404),
            _ => false,
        }
    }

    /// Check if this error reports a create racing an existing object
    pub fn is_already_exists(&self) -> bool {
        match self {
            Error::AlreadyExists(_) => true,
            Error::KubeError(kube::Error::Api(api_err)) => {
                api_err.code == 409 && api_err.reason == "AlreadyExists"
            }
            _ => false,
        }
    }

    /// Check if this error reports a stale resource version
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict(_) => true,
            Error::KubeError(kube::Error::Api(api_err)) => {
                api_err.code == 409 && api_err.reason == "Conflict"
            }
            _ => false,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::KubeError(e) => match e {
                kube::Error::Api(api_err) => {
                    // 4xx errors (except 404, 409 and 429) are not retryable
                    let code = api_err.code;
                    if (400..500).contains(&code) {
                        return matches!(code, 404 | 409 | 429);
                    }
                    true
                }
                // Network and other errors are retryable
                _ => true,
            },
            Error::NotFound(_) => true, // Resource might appear later
            Error::AlreadyExists(_) => true,
            Error::Conflict(_) => true,
            Error::TransientError(_) => true,
            Error::Cancelled => true,
            Error::MalformedError(_) => false,
            Error::InvalidConfig(_) => false,
            Error::SerializationError(_) => false,
        }
    }
}

fn api_code(e: &kube::Error) -> Option<u16> {
    match e {
        kube::Error::Api(api_err) => Some(api_err.code),
        _ => None,
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Exponential backoff configuration used by the error policy
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Initial delay for first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for each subsequent retry
    pub multiplier: f64,
    /// Random jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300), // 5 minutes
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Calculate the backoff delay for a given retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay_secs =
            self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);

        let jitter_range = base_delay_secs * self.jitter;
        let jitter = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;
        let delay_with_jitter = (base_delay_secs + jitter).max(0.0);

        let capped_delay = delay_with_jitter.min(self.max_delay.as_secs_f64());

        Duration::from_secs_f64(capped_delay)
    }

    /// Get the delay for an error, with different handling for retryable vs non-retryable
    pub fn delay_for_error(&self, error: &Error, attempt: u32) -> Duration {
        if error.is_retryable() {
            self.delay_for_attempt(attempt)
        } else {
            // Non-retryable errors still requeue, just at the slowest cadence
            self.max_delay
        }
    }
}

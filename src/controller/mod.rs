pub mod artifacts;
pub mod condition;
pub mod context;
pub mod error;
pub mod ports;
pub mod reconciler;
pub mod status;
pub mod store;

pub use context::Context;
pub use error::{BackoffConfig, Error, Result};
pub use reconciler::{error_policy, reconcile, reconcile_pass};
pub use store::{ClusterStore, KubeStore, ObjectKey};

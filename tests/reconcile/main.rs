// Test code is allowed to panic on failure
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

//! Reconcile pass tests against an in-memory cluster store
//!
//! Each test seeds a [`MemoryStore`], runs one or more passes through
//! `reconcile_pass` and inspects what the store ended up holding. No cluster
//! is needed:
//!
//! ```bash
//! cargo test --test reconcile
//! ```

#[path = "../common/mod.rs"]
mod common;

mod artifacts;
mod node_ports;
mod orchestration;

use std::sync::Arc;

use common::MemoryStore;
use compute_node_operator::controller::{Context, ObjectKey, Result, reconcile_pass};
use compute_node_operator::OperatorConfig;
use kube::runtime::controller::Action;
use tokio_util::sync::CancellationToken;

/// Context over `store` with default configuration
pub fn context(store: &Arc<MemoryStore>) -> Context {
    Context::with_store(store.clone(), OperatorConfig::default())
}

pub fn context_with(store: &Arc<MemoryStore>, config: OperatorConfig) -> Context {
    Context::with_store(store.clone(), config)
}

/// One uncancelled pass
pub async fn run_pass(ctx: &Context, key: &ObjectKey) -> Result<Action> {
    reconcile_pass(key, ctx, &CancellationToken::new()).await
}

// Test code is allowed to panic on failure
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

//! Unit tests for the ComputeNode operator
//!
//! This module contains unit tests for:
//! - Resource generators (Deployment, Service, ConfigMap)
//! - CRD wire shape
//! - Status projection

#[path = "../common/mod.rs"]
mod common;

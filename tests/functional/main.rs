// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Functional tests for the pod admission pipeline.
//!
//! These tests drive complete admission reviews through the request adapter
//! and the HTTP router WITHOUT requiring a live Kubernetes cluster. Patches
//! are applied to the submitted pod with `json_patch` to check what the API
//! server would persist.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_second_admission_is_a_no_op
//! ```

#[path = "../common/mod.rs"]
mod common;

mod router_tests;

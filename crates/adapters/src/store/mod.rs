// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build snapshot persistence adapters

mod memory;
mod noop;

pub use memory::MemorySnapshotStore;
pub use noop::NoOpSnapshotStore;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeSnapshotStore;

use async_trait::async_trait;
use kiln_core::Build;
use thiserror::Error;

/// Errors from snapshot publishing
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("snapshot rejected for build {build_id}: {reason}")]
    Rejected { build_id: String, reason: String },
}

/// Receives full build snapshots after every flow mutation
///
/// Publishing is fire-and-forget from the flow's point of view: callers log
/// a failure and carry on.
#[async_trait]
pub trait SnapshotStore: Clone + Send + Sync + 'static {
    async fn publish(&self, build: &Build) -> Result<(), StoreError>;
}

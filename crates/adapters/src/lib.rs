// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for the collaborators a flow talks to

pub mod container;
pub mod store;
pub mod traced;

pub use container::{ContainerAdapter, ContainerError, DockerCliAdapter, NoOpContainerAdapter};
pub use store::{MemorySnapshotStore, NoOpSnapshotStore, SnapshotStore, StoreError};
pub use traced::{TracedContainerAdapter, TracedSnapshotStore};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use container::{ContainerCall, FakeContainerAdapter};
#[cfg(any(test, feature = "test-support"))]
pub use store::FakeSnapshotStore;

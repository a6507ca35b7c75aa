// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container cleanup adapters
//!
//! The engine never stops provider work itself. On abort it hands the ids of
//! the containers it canceled to this collaborator, and on delete it hands
//! over every container the build ever ran.

mod docker;
mod noop;

pub use docker::DockerCliAdapter;
pub use noop::NoOpContainerAdapter;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{ContainerCall, FakeContainerAdapter};

use async_trait::async_trait;
use thiserror::Error;

/// Errors from container operations
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("container not found: {0}")]
    NotFound(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
}

#[async_trait]
pub trait ContainerAdapter: Clone + Send + Sync + 'static {
    /// Stop running containers
    async fn kill(&self, ids: &[String]) -> Result<(), ContainerError>;

    /// Remove containers, stopping them first if needed
    async fn delete(&self, ids: &[String]) -> Result<(), ContainerError>;
}

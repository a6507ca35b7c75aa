// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker CLI container adapter

use super::{ContainerAdapter, ContainerError};
use async_trait::async_trait;
use tokio::process::Command;

/// Shells out to the `docker` binary
#[derive(Clone)]
pub struct DockerCliAdapter {
    binary: String,
}

impl DockerCliAdapter {
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str], ids: &[String]) -> Result<(), ContainerError> {
        if ids.is_empty() {
            return Ok(());
        }

        let output = Command::new(&self.binary)
            .args(args)
            .args(ids)
            .output()
            .await
            .map_err(|e| ContainerError::CommandFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No such container") {
                return Err(ContainerError::NotFound(stderr.trim().to_string()));
            }
            return Err(ContainerError::CommandFailed(stderr.trim().to_string()));
        }

        Ok(())
    }
}

impl Default for DockerCliAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerAdapter for DockerCliAdapter {
    async fn kill(&self, ids: &[String]) -> Result<(), ContainerError> {
        self.run(&["kill"], ids).await
    }

    async fn delete(&self, ids: &[String]) -> Result<(), ContainerError> {
        self.run(&["rm", "--force"], ids).await
    }
}

#[cfg(test)]
#[path = "docker_tests.rs"]
mod tests;

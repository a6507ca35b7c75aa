// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! No-op container adapter for hosts without a container runtime.

use super::{ContainerAdapter, ContainerError};
use async_trait::async_trait;

#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpContainerAdapter;

impl NoOpContainerAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ContainerAdapter for NoOpContainerAdapter {
    async fn kill(&self, _ids: &[String]) -> Result<(), ContainerError> {
        Ok(())
    }

    async fn delete(&self, _ids: &[String]) -> Result<(), ContainerError> {
        Ok(())
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! No-op store for hosts without persistence.

use super::{SnapshotStore, StoreError};
use async_trait::async_trait;
use kiln_core::Build;

/// Store that drops every snapshot.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpSnapshotStore;

impl NoOpSnapshotStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SnapshotStore for NoOpSnapshotStore {
    async fn publish(&self, _build: &Build) -> Result<(), StoreError> {
        Ok(())
    }
}

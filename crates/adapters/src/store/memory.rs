// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory store keeping the latest snapshot per build

use super::{SnapshotStore, StoreError};
use async_trait::async_trait;
use kiln_core::{Build, BuildId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct MemorySnapshotStore {
    latest: Arc<Mutex<HashMap<BuildId, Build>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &BuildId) -> Option<Build> {
        self.latest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn remove(&self, id: &BuildId) -> Option<Build> {
        self.latest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
    }

    pub fn len(&self) -> usize {
        self.latest.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn publish(&self, build: &Build) -> Result<(), StoreError> {
        self.latest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(build.id.clone(), build.clone());
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

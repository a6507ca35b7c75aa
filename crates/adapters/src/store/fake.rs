// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake snapshot store for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{SnapshotStore, StoreError};
use async_trait::async_trait;
use kiln_core::{Build, BuildId};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct FakeStoreState {
    published: Vec<Build>,
    failing: bool,
}

/// Records every published snapshot in order
#[derive(Clone, Default)]
pub struct FakeSnapshotStore {
    inner: Arc<Mutex<FakeStoreState>>,
}

impl FakeSnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent publishes fail (they are still recorded)
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).failing = failing;
    }

    pub fn published(&self) -> Vec<Build> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .published
            .clone()
    }

    pub fn published_for(&self, id: &BuildId) -> Vec<Build> {
        self.published()
            .into_iter()
            .filter(|b| &b.id == id)
            .collect()
    }

    pub fn latest(&self, id: &BuildId) -> Option<Build> {
        self.published_for(id).pop()
    }

    pub fn count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .published
            .len()
    }
}

#[async_trait]
impl SnapshotStore for FakeSnapshotStore {
    async fn publish(&self, build: &Build) -> Result<(), StoreError> {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.published.push(build.clone());
        if state.failing {
            return Err(StoreError::Unavailable("fake store failing".into()));
        }
        Ok(())
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Active-flow table
//!
//! The only state shared between builds. Each flow sits behind its own async
//! mutex, so at most one `process()` call runs per flow while different
//! flows proceed independently.

use crate::error::EngineError;
use crate::flow::Flow;
use kiln_core::BuildId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

pub type FlowHandle = Arc<Mutex<Flow>>;

#[derive(Clone, Default)]
pub struct FlowTable {
    inner: Arc<RwLock<HashMap<BuildId, FlowHandle>>>,
}

impl FlowTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a flow; a build id can only have one active flow
    pub fn insert(&self, build_id: BuildId, flow: Flow) -> Result<FlowHandle, EngineError> {
        let mut flows = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if flows.contains_key(&build_id) {
            return Err(EngineError::AlreadyActive(build_id));
        }
        let handle = Arc::new(Mutex::new(flow));
        flows.insert(build_id, Arc::clone(&handle));
        Ok(handle)
    }

    pub fn get(&self, build_id: &BuildId) -> Option<FlowHandle> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(build_id)
            .cloned()
    }

    pub fn remove(&self, build_id: &BuildId) -> Option<FlowHandle> {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(build_id)
    }

    pub fn contains(&self, build_id: &BuildId) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(build_id)
    }

    /// Ids of every active flow, sorted
    pub fn ids(&self) -> Vec<BuildId> {
        let mut ids: Vec<BuildId> = self
            .inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "table_tests.rs"]
mod tests;

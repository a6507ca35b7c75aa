// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake container adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{ContainerAdapter, ContainerError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Recorded container call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerCall {
    Kill { ids: Vec<String> },
    Delete { ids: Vec<String> },
}

#[derive(Clone, Default)]
pub struct FakeContainerAdapter {
    calls: Arc<Mutex<Vec<ContainerCall>>>,
    failing: Arc<Mutex<bool>>,
}

impl FakeContainerAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<ContainerCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, call: ContainerCall) -> Result<(), ContainerError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(ContainerError::CommandFailed("fake container failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerAdapter for FakeContainerAdapter {
    async fn kill(&self, ids: &[String]) -> Result<(), ContainerError> {
        self.record(ContainerCall::Kill { ids: ids.to_vec() })
    }

    async fn delete(&self, ids: &[String]) -> Result<(), ContainerError> {
        self.record(ContainerCall::Delete { ids: ids.to_vec() })
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;

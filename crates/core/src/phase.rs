// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Phase: one unit of work inside a stage
//!
//! A phase accumulates one run result per provider pass. Its final result is
//! derived from those results and decides stage completion.

use crate::error::ModelError;
use crate::status::Status;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Position within its stage
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_script: Option<String>,
    /// In-memory only, never persisted
    #[serde(skip)]
    pub run_results: Vec<Status>,
}

impl Phase {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Result<Self, ModelError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ModelError::Blank { field: "phase id" });
        }
        Ok(Self {
            id,
            name: name.into(),
            index: 0,
            status: Status::Parked,
            container_id: None,
            container_host: None,
            container_port: None,
            pre_script: None,
            main_script: None,
            run_results: Vec::new(),
        })
    }

    pub fn with_scripts(self, pre: Option<String>, main: Option<String>) -> Self {
        Self {
            pre_script: pre,
            main_script: main,
            ..self
        }
    }

    /// IN_FLIGHT until a result exists, then the first non-DONE result, else DONE
    pub fn final_result(&self) -> Status {
        if self.run_results.is_empty() {
            return Status::InFlight;
        }
        self.run_results
            .iter()
            .copied()
            .find(|r| matches!(r, Status::InFlight | Status::Failed | Status::Canceled))
            .unwrap_or(Status::Done)
    }

    /// Start a fresh pass: the phase goes IN_FLIGHT with a pending result
    pub fn begin_run(&mut self, index: usize) {
        self.index = index;
        self.status = Status::InFlight;
        self.run_results.push(Status::InFlight);
    }

    /// Resolve the pending result of the current pass
    pub fn finish_run(&mut self, result: Status) {
        match self.run_results.last_mut() {
            Some(last) if *last == Status::InFlight => *last = result,
            _ => self.run_results.push(result),
        }
    }

    pub fn apply_container(&mut self, patch: &PhasePatch) {
        if let Some(id) = &patch.container_id {
            self.container_id = Some(id.clone());
        }
        if let Some(host) = &patch.container_host {
            self.container_host = Some(host.clone());
        }
        if let Some(port) = patch.container_port {
            self.container_port = Some(port);
        }
    }

    pub fn pre_script_file(&self) -> String {
        format!("{}_pre.sh", self.id)
    }

    pub fn main_script_file(&self) -> String {
        format!("{}.sh", self.id)
    }
}

/// Partial phase carried by completion events and ad-hoc updates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasePatch {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_port: Option<u16>,
}

impl PhasePatch {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    pub fn container(self, id: impl Into<String>) -> Self {
        Self {
            container_id: Some(id.into()),
            ..self
        }
    }

    pub fn host(self, host: impl Into<String>, port: u16) -> Self {
        Self {
            container_host: Some(host.into()),
            container_port: Some(port),
            ..self
        }
    }

    pub fn has_container(&self) -> bool {
        self.container_id.is_some()
    }
}

#[cfg(test)]
#[path = "phase_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build: one executable instance of a pipeline
//!
//! Only the flow that owns a build mutates it. Every mutation is followed by
//! publishing a full snapshot to the store.

use crate::error::ModelError;
use crate::phase::Phase;
use crate::repository::{Repository, Workspace};
use crate::status::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a build
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(pub String);

impl BuildId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for BuildId {
    fn from(s: String) -> Self {
        BuildId(s)
    }
}

impl From<&str> for BuildId {
    fn from(s: &str) -> Self {
        BuildId(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub id: BuildId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<String>,
    #[serde(default)]
    pub status: Status,
    /// Flat list of every phase across all stages
    #[serde(default)]
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub workspace: Workspace,
    #[serde(default)]
    pub repository: Repository,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
}

impl Build {
    pub fn new(id: impl Into<BuildId>, now: DateTime<Utc>) -> Result<Self, ModelError> {
        let id = id.into();
        if id.0.trim().is_empty() {
            return Err(ModelError::Blank { field: "build id" });
        }
        Ok(Self {
            id,
            pipeline_id: None,
            status: Status::Parked,
            phases: Vec::new(),
            workspace: Workspace::default(),
            repository: Repository::none(),
            status_message: None,
            created_at: now,
            end_date: None,
        })
    }

    pub fn with_pipeline(self, pipeline_id: impl Into<String>) -> Self {
        Self {
            pipeline_id: Some(pipeline_id.into()),
            ..self
        }
    }

    pub fn with_phases(self, phases: Vec<Phase>) -> Self {
        Self { phases, ..self }
    }

    pub fn with_repository(self, repository: Repository) -> Self {
        Self { repository, ..self }
    }

    pub fn can_abort(&self) -> bool {
        self.status.is_cancellable()
    }

    pub fn can_delete(&self) -> bool {
        self.status.is_terminal()
    }

    /// Cancel the build and every unfinished phase.
    ///
    /// Returns the container ids assigned to the phases that were canceled.
    pub fn mark_for_abort(&mut self, now: DateTime<Utc>) -> Vec<String> {
        self.status = Status::Canceled;
        self.end_date = Some(now);

        let mut container_ids = Vec::new();
        for phase in self.phases.iter_mut().filter(|p| p.status.is_cancellable()) {
            phase.status = Status::Canceled;
            if let Some(id) = phase.container_id.as_ref().filter(|id| !id.trim().is_empty()) {
                container_ids.push(id.clone());
            }
        }
        container_ids
    }

    pub fn mark_for_failure(&mut self, message: Option<String>, now: DateTime<Utc>) {
        self.status = Status::Failed;
        self.end_date = Some(now);
        if message.is_some() {
            self.status_message = message;
        }
        for phase in self.phases.iter_mut().filter(|p| p.status.is_cancellable()) {
            phase.status = Status::Failed;
        }
    }

    /// DONE only if every phase is DONE, FAILED otherwise
    pub fn mark_for_complete(&mut self, now: DateTime<Utc>) {
        self.end_date = Some(now);
        self.status = if self.phases.iter().all(|p| p.status == Status::Done) {
            Status::Done
        } else {
            Status::Failed
        };
    }

    pub fn all_container_ids(&self) -> Vec<String> {
        self.phases
            .iter()
            .filter_map(|p| p.container_id.clone())
            .filter(|id| !id.trim().is_empty())
            .collect()
    }
}

#[cfg(test)]
#[path = "build_tests.rs"]
mod tests;

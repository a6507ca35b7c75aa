// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command/event envelopes exchanged between flows and providers
//!
//! Commands travel point-to-point to one provider, addressed by capability
//! and order. Completion events travel back on a channel shared by every
//! provider of a capability. A [`CommandToken`] binds each reply to the
//! command that caused it.

use crate::build::{Build, BuildId};
use crate::error::ModelError;
use crate::phase::{Phase, PhasePatch};
use crate::repository::{Repository, Workspace};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status code of a successful step
pub const STATUS_OK: u16 = 200;

/// Kind of step a provider can perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Setup,
    RunPhase,
    TearDown,
}

impl Capability {
    pub const ALL: [Capability; 3] = [Capability::Setup, Capability::RunPhase, Capability::TearDown];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Setup => "setup",
            Capability::RunPhase => "run_phase",
            Capability::TearDown => "tear_down",
        }
    }

    /// Event kind a provider replies with after handling this capability
    pub fn completion(self) -> EventKind {
        match self {
            Capability::Setup => EventKind::SetupEnd,
            Capability::RunPhase => EventKind::PhaseEnd,
            Capability::TearDown => EventKind::TearDownEnd,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "setup" => Ok(Capability::Setup),
            "run_phase" | "runphase" => Ok(Capability::RunPhase),
            "tear_down" | "teardown" => Ok(Capability::TearDown),
            _ => Err(ModelError::UnknownCapability(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    SetupEnd,
    PhaseEnd,
    TearDownEnd,
    /// Ad-hoc container update; never advances a flow
    PhaseUpdate,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::SetupEnd => "pipeline:setup:end",
            EventKind::PhaseEnd => "pipeline:phase:end",
            EventKind::TearDownEnd => "pipeline:tearDown:end",
            EventKind::PhaseUpdate => "pipeline:phase:update",
        }
    }

    fn requires_phase(self) -> bool {
        matches!(self, EventKind::PhaseEnd | EventKind::PhaseUpdate)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mailbox of one provider for one capability
///
/// `rank` is the provider's position after the stable sort, so providers
/// that declare the same order still get distinct mailboxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    pub capability: Capability,
    pub order: i32,
    pub rank: usize,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipeline:{}:{}", self.capability, self.order)
    }
}

/// Correlation token minted by a flow for each command it sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandToken(pub u64);

impl fmt::Display for CommandToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub kind: Capability,
    pub token: CommandToken,
    pub build: Build,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

impl Command {
    pub fn setup(token: CommandToken, build: Build, script: Option<String>) -> Self {
        Self {
            kind: Capability::Setup,
            token,
            build,
            phase: None,
            script,
        }
    }

    pub fn run_phase(token: CommandToken, build: Build, phase: Phase) -> Self {
        Self {
            kind: Capability::RunPhase,
            token,
            build,
            phase: Some(phase),
            script: None,
        }
    }

    pub fn tear_down(token: CommandToken, build: Build) -> Self {
        Self {
            kind: Capability::TearDown,
            token,
            build,
            phase: None,
            script: None,
        }
    }

    pub fn build_id(&self) -> &BuildId {
        &self.build.id
    }
}

fn default_status_code() -> u16 {
    STATUS_OK
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub build_id: BuildId,
    pub token: CommandToken,
    #[serde(default = "default_status_code")]
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<Workspace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<Repository>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_repository: Option<Repository>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<PhasePatch>,
    /// Phases grouped by stage; only on setup completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stages: Option<Vec<Vec<Phase>>>,
}

impl Event {
    /// Successful completion of `command`
    pub fn completion(command: &Command) -> Self {
        let mut event = Self::bare(command.kind.completion(), command.build.id.clone(), command.token);
        if let Some(phase) = &command.phase {
            event.phase = Some(PhasePatch::new(phase.index));
        }
        event
    }

    /// Failed completion of `command`
    pub fn failed(command: &Command, status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            status_message: Some(message.into()),
            ..Self::completion(command)
        }
    }

    pub fn phase_update(build_id: BuildId, token: CommandToken, patch: PhasePatch) -> Self {
        Self {
            phase: Some(patch),
            ..Self::bare(EventKind::PhaseUpdate, build_id, token)
        }
    }

    fn bare(kind: EventKind, build_id: BuildId, token: CommandToken) -> Self {
        Self {
            kind,
            build_id,
            token,
            status_code: STATUS_OK,
            status_message: None,
            workspace: None,
            repository: None,
            child_repository: None,
            phase: None,
            stages: None,
        }
    }

    pub fn with_status(self, status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            status_message: Some(message.into()),
            ..self
        }
    }

    pub fn with_workspace(self, workspace: Workspace) -> Self {
        Self {
            workspace: Some(workspace),
            ..self
        }
    }

    pub fn with_repository(self, repository: Repository) -> Self {
        Self {
            repository: Some(repository),
            ..self
        }
    }

    pub fn with_child_repository(self, child: Repository) -> Self {
        Self {
            child_repository: Some(child),
            ..self
        }
    }

    pub fn with_phase(self, patch: PhasePatch) -> Self {
        Self {
            phase: Some(patch),
            ..self
        }
    }

    pub fn with_stages(self, stages: Vec<Vec<Phase>>) -> Self {
        Self {
            stages: Some(stages),
            ..self
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_OK
    }

    /// Reject malformed events once, at ingress
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.build_id.0.trim().is_empty() {
            return Err(ModelError::Blank { field: "build id" });
        }
        if !(100..=599).contains(&self.status_code) {
            return Err(ModelError::InvalidStatusCode(self.status_code));
        }
        if self.kind.requires_phase() && self.phase.is_none() {
            return Err(ModelError::MissingPhase {
                kind: self.kind.name().to_string(),
                build_id: self.build_id.to_string(),
            });
        }
        if self.stages.is_some() && self.kind != EventKind::SetupEnd {
            return Err(ModelError::UnexpectedStages {
                kind: self.kind.name().to_string(),
                build_id: self.build_id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability contract implemented by every step provider
//!
//! A provider declares which capabilities it serves and its order among
//! peers. For every command it receives, its host publishes exactly one
//! completion event built from the handler's result.

use crate::bus::EventOutlet;
use crate::error::StepError;
use async_trait::async_trait;
use kiln_core::{
    BuildId, Capability, Command, CommandToken, Event, Phase, PhasePatch, Repository, Workspace,
    STATUS_OK,
};

/// Status used for provider failures without a usable code
pub const STATUS_INTERNAL: u16 = 500;

/// Order used when a provider does not declare one
pub const DEFAULT_ORDER: i32 = 100;

#[async_trait]
pub trait Provider: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn capabilities(&self) -> &[Capability];

    /// Lower orders run first
    fn order(&self) -> i32 {
        DEFAULT_ORDER
    }

    fn serves(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    async fn handle(&self, command: &Command, ctx: &StepContext) -> Result<StepOutput, StepError>;
}

/// Handle given to a provider while it works on one command
#[derive(Clone)]
pub struct StepContext {
    build_id: BuildId,
    token: CommandToken,
    outlet: EventOutlet,
}

impl StepContext {
    pub fn new(build_id: BuildId, token: CommandToken, outlet: EventOutlet) -> Self {
        Self {
            build_id,
            token,
            outlet,
        }
    }

    pub fn build_id(&self) -> &BuildId {
        &self.build_id
    }

    pub fn token(&self) -> CommandToken {
        self.token
    }

    /// Report container fields before the step completes
    pub fn publish_phase_update(&self, patch: PhasePatch) {
        self.outlet.publish(Event::phase_update(
            self.build_id.clone(),
            self.token,
            patch,
        ));
    }
}

/// Side effects of a successful step, carried back on the completion event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    pub workspace: Option<Workspace>,
    pub repository: Option<Repository>,
    pub child_repository: Option<Repository>,
    pub container: Option<PhasePatch>,
    pub stages: Option<Vec<Vec<Phase>>>,
}

impl StepOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workspace(self, workspace: Workspace) -> Self {
        Self {
            workspace: Some(workspace),
            ..self
        }
    }

    pub fn repository(self, repository: Repository) -> Self {
        Self {
            repository: Some(repository),
            ..self
        }
    }

    pub fn child_repository(self, child: Repository) -> Self {
        Self {
            child_repository: Some(child),
            ..self
        }
    }

    pub fn container(self, patch: PhasePatch) -> Self {
        Self {
            container: Some(patch),
            ..self
        }
    }

    pub fn stages(self, stages: Vec<Vec<Phase>>) -> Self {
        Self {
            stages: Some(stages),
            ..self
        }
    }
}

/// Status reported for a provider failure.
///
/// A failure must stay a failure and must pass event validation, so 200 and
/// codes outside 100..=599 collapse to 500.
fn failure_code(status_code: u16) -> u16 {
    if status_code == STATUS_OK || !(100..=599).contains(&status_code) {
        STATUS_INTERNAL
    } else {
        status_code
    }
}

/// Build the single completion event owed for `command`
pub fn completion_event(command: &Command, result: Result<StepOutput, StepError>) -> Event {
    let output = match result {
        Ok(output) => output,
        Err(err) => {
            return Event::failed(command, failure_code(err.status_code), err.message);
        }
    };

    let mut event = Event::completion(command);
    event.workspace = output.workspace;
    event.repository = output.repository;
    event.child_repository = output.child_repository;
    if let (Some(phase), Some(container)) = (event.phase.as_mut(), output.container) {
        phase.container_id = container.container_id;
        phase.container_host = container.container_host;
        phase.container_port = container.container_port;
    }
    if command.kind == Capability::Setup {
        event.stages = output.stages;
    }
    event
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;

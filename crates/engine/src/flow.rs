// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flow: the per-build state machine
//!
//! A flow walks SETUP → RUN → TEARDOWN exactly once. Setup and teardown
//! command their provider chains one at a time. RUN executes stages in
//! sequence; within a stage every phase is commanded at once and walks the
//! phase-provider chain on its own.
//!
//! The flow performs no I/O. Each call returns the effects the host must
//! carry out, in order.
//!
//! Abort is lazy: it marks the build CANCELED and sets a flag. The next
//! accepted event discards whatever SETUP/RUN work is left and moves the
//! flow to TEARDOWN.

use crate::effect::FlowEffect;
use crate::registry::ProviderChains;
use chrono::{DateTime, Utc};
use kiln_core::{
    Address, Build, Capability, Command, CommandToken, Event, EventKind, Phase, Stage, Status,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Top-level flow state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Setup,
    Run,
    TearDown,
}

impl FlowState {
    fn capability(self) -> Capability {
        match self {
            FlowState::Setup => Capability::Setup,
            FlowState::Run => Capability::RunPhase,
            FlowState::TearDown => Capability::TearDown,
        }
    }
}

/// Whether the state machine should keep going without a new event
enum Step {
    Again,
    Wait,
}

pub struct Flow {
    build: Build,
    script: Option<String>,
    chains: Arc<ProviderChains>,
    states: VecDeque<FlowState>,
    /// Commands sent so far in the current setup/teardown state
    dispatched: usize,
    pending_step: Option<CommandToken>,
    stages: VecDeque<Stage>,
    /// Commands sent so far per phase index of the running stage
    phase_steps: HashMap<usize, usize>,
    pending_phases: HashMap<usize, CommandToken>,
    /// Every token issued in the running stage, by phase index
    stage_tokens: HashMap<CommandToken, usize>,
    aborted: bool,
    ended: bool,
    next_token: u64,
    effects: Vec<FlowEffect>,
}

impl Flow {
    pub fn new(build: Build, script: Option<String>, chains: Arc<ProviderChains>) -> Self {
        Self {
            build,
            script,
            chains,
            states: VecDeque::from([FlowState::Setup, FlowState::Run, FlowState::TearDown]),
            dispatched: 0,
            pending_step: None,
            stages: VecDeque::new(),
            phase_steps: HashMap::new(),
            pending_phases: HashMap::new(),
            stage_tokens: HashMap::new(),
            aborted: false,
            ended: false,
            next_token: 0,
            effects: Vec::new(),
        }
    }

    pub fn build(&self) -> &Build {
        &self.build
    }

    pub fn state(&self) -> Option<FlowState> {
        self.states.front().copied()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Stages not yet finished, including the running one
    pub fn queued_stages(&self) -> usize {
        self.stages.len()
    }

    /// Phase-provider commands sent so far for a phase of the running stage
    pub fn phase_progress(&self, index: usize) -> Option<usize> {
        self.phase_steps.get(&index).copied()
    }

    /// Tokens the flow is currently waiting on
    pub fn outstanding(&self) -> Vec<CommandToken> {
        let mut tokens: Vec<CommandToken> = self
            .pending_step
            .into_iter()
            .chain(self.pending_phases.values().copied())
            .collect();
        tokens.sort();
        tokens
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Vec<FlowEffect> {
        self.build.status = Status::InFlight;
        tracing::info!(build_id = %self.build.id, "flow started");
        self.drive(None, now);
        std::mem::take(&mut self.effects)
    }

    /// Cancel the build. Idempotent; only the first call returns container ids.
    pub fn abort(&mut self, now: DateTime<Utc>) -> Vec<String> {
        if self.aborted {
            tracing::warn!(build_id = %self.build.id, "flow was already aborted");
            return Vec::new();
        }
        self.aborted = true;
        let ids = self.build.mark_for_abort(now);
        tracing::info!(
            build_id = %self.build.id,
            state = ?self.state(),
            containers = ids.len(),
            "flow aborted"
        );
        ids
    }

    pub fn process(&mut self, event: Event, now: DateTime<Utc>) -> Vec<FlowEffect> {
        if self.ended {
            tracing::warn!(
                build_id = %self.build.id,
                kind = %event.kind,
                token = %event.token,
                "event after flow end, dropping"
            );
            return Vec::new();
        }

        if event.kind == EventKind::PhaseUpdate {
            self.apply_phase_update(&event);
        } else if self.accepts(&event) {
            self.drive(Some(event), now);
        } else {
            tracing::warn!(
                build_id = %self.build.id,
                kind = %event.kind,
                token = %event.token,
                state = ?self.state(),
                phase = event.phase.as_ref().map(|p| p.index),
                "stale or unexpected event, dropping"
            );
        }
        std::mem::take(&mut self.effects)
    }

    /// A completion is accepted only if it answers a command still outstanding
    pub fn accepts(&self, event: &Event) -> bool {
        if self.ended {
            return false;
        }
        match (self.state(), event.kind) {
            (Some(FlowState::Setup), EventKind::SetupEnd)
            | (Some(FlowState::TearDown), EventKind::TearDownEnd) => {
                self.pending_step == Some(event.token)
            }
            (Some(FlowState::Run), EventKind::PhaseEnd) => event
                .phase
                .as_ref()
                .and_then(|p| self.pending_phases.get(&p.index))
                == Some(&event.token),
            _ => false,
        }
    }

    fn drive(&mut self, mut event: Option<Event>, now: DateTime<Utc>) {
        loop {
            let Some(state) = self.state() else {
                return;
            };

            let step = if self.aborted && state != FlowState::TearDown {
                // Remaining SETUP/RUN work is discarded along with the event
                event = None;
                self.next_state();
                Step::Again
            } else {
                match state {
                    FlowState::Setup => self.setup(event.take(), now),
                    FlowState::Run => self.run(event.take()),
                    FlowState::TearDown => self.tear_down(event.take(), now),
                }
            };

            if let Step::Wait = step {
                return;
            }
        }
    }

    fn setup(&mut self, event: Option<Event>, now: DateTime<Utc>) -> Step {
        if let Some(event) = event {
            self.pending_step = None;
            if !self.apply_step_event(event, now) {
                tracing::info!(build_id = %self.build.id, "setup failed, skipping to teardown");
                self.states.pop_front();
                self.next_state();
                return Step::Again;
            }
        }
        self.dispatch_step(FlowState::Setup)
    }

    fn tear_down(&mut self, event: Option<Event>, now: DateTime<Utc>) -> Step {
        if let Some(event) = event {
            self.pending_step = None;
            if !self.apply_step_event(event, now) {
                tracing::info!(build_id = %self.build.id, "teardown failed");
                self.end();
                return Step::Wait;
            }
        }

        if self.dispatched < self.chains.count(Capability::TearDown) {
            return self.dispatch_step(FlowState::TearDown);
        }

        if self.build.status != Status::Failed && !self.aborted {
            self.build.mark_for_complete(now);
            self.publish();
        }
        self.end();
        Step::Wait
    }

    /// Command the next provider of a setup/teardown chain, or leave the state
    fn dispatch_step(&mut self, state: FlowState) -> Step {
        let capability = state.capability();
        let Some(address) = self.chains.address(capability, self.dispatched) else {
            self.next_state();
            return Step::Again;
        };
        self.dispatched += 1;

        let token = self.mint();
        self.pending_step = Some(token);
        let command = match state {
            FlowState::Setup => Command::setup(token, self.build.clone(), self.script.clone()),
            _ => Command::tear_down(token, self.build.clone()),
        };
        self.dispatch(address, command);
        Step::Wait
    }

    /// Fold a setup/teardown completion into the build. Returns false on failure.
    ///
    /// Once aborted, step results no longer touch the build.
    fn apply_step_event(&mut self, event: Event, now: DateTime<Utc>) -> bool {
        if self.aborted {
            return true;
        }

        if !event.is_success() {
            tracing::info!(
                build_id = %self.build.id,
                kind = %event.kind,
                status_code = event.status_code,
                message = event.status_message.as_deref().unwrap_or(""),
                "step failed"
            );
            self.build.mark_for_failure(event.status_message, now);
            self.publish();
            return false;
        }

        if let Some(workspace) = event.workspace {
            self.build.workspace = workspace;
        }
        if let Some(repository) = event.repository {
            self.build.repository = repository;
        }
        if let Some(stages) = event.stages {
            self.load_stages(stages);
        }
        self.publish();
        true
    }

    fn load_stages(&mut self, stages: Vec<Vec<Phase>>) {
        self.stages.clear();
        self.build.phases.clear();

        for stage in stages {
            let first = self.build.phases.len();
            for mut phase in stage {
                phase.status = Status::Parked;
                phase.run_results.clear();
                self.build.phases.push(phase);
            }
            self.stages
                .push_back(Stage::new((first..self.build.phases.len()).collect()));
        }
        tracing::debug!(
            build_id = %self.build.id,
            stages = self.stages.len(),
            phases = self.build.phases.len(),
            "stages loaded"
        );
    }

    fn run(&mut self, event: Option<Event>) -> Step {
        let Some(stage) = self.stages.front().cloned() else {
            self.next_state();
            return Step::Again;
        };

        match event {
            None => {
                self.start_stage(&stage);
                self.check_stage(&stage)
            }
            Some(event) => self.on_phase_end(&stage, event),
        }
    }

    /// Fan out: every phase of the stage gets its first command in one batch
    fn start_stage(&mut self, stage: &Stage) {
        self.phase_steps.clear();
        self.pending_phases.clear();
        self.stage_tokens.clear();
        let no_providers = self.chains.count(Capability::RunPhase) == 0;

        for (index, &pos) in stage.members().iter().enumerate() {
            let Some(phase) = self.build.phases.get_mut(pos) else {
                continue;
            };
            phase.begin_run(index);
            if no_providers {
                phase.finish_run(Status::Done);
                phase.status = phase.final_result();
            } else {
                self.dispatch_phase(index, pos);
            }
        }

        tracing::debug!(
            build_id = %self.build.id,
            phases = stage.len(),
            remaining = self.stages.len(),
            "stage started"
        );
        self.publish();
    }

    fn dispatch_phase(&mut self, index: usize, pos: usize) {
        let sent = self.phase_steps.get(&index).copied().unwrap_or(0);
        let Some(address) = self.chains.address(Capability::RunPhase, sent) else {
            return;
        };
        let Some(phase) = self.build.phases.get(pos).cloned() else {
            return;
        };
        self.phase_steps.insert(index, sent + 1);

        let token = self.mint();
        self.pending_phases.insert(index, token);
        self.stage_tokens.insert(token, index);
        self.dispatch(address, Command::run_phase(token, self.build.clone(), phase));
    }

    fn on_phase_end(&mut self, stage: &Stage, event: Event) -> Step {
        let ok = event.is_success();
        let Event {
            phase,
            child_repository,
            status_code,
            status_message,
            ..
        } = event;
        let Some(patch) = phase else {
            return Step::Wait;
        };
        let index = patch.index;
        self.pending_phases.remove(&index);

        let Some(pos) = stage.position(index) else {
            tracing::warn!(build_id = %self.build.id, index, "phase index outside stage");
            return Step::Wait;
        };

        if let Some(child) = child_repository {
            self.build.repository.update_child(child);
        }

        let chain_len = self.chains.count(Capability::RunPhase);
        let sent = self.phase_steps.get(&index).copied().unwrap_or(0);
        let Some(phase) = self.build.phases.get_mut(pos) else {
            return Step::Wait;
        };

        if !ok {
            phase.finish_run(Status::Failed);
            phase.status = Status::Failed;
            tracing::info!(
                build_id = %self.build.id,
                phase = %phase.id,
                status_code,
                "phase failed"
            );
            if status_message.is_some() {
                self.build.status_message = status_message;
            }
            self.publish();
            return self.check_stage(stage);
        }

        phase.finish_run(Status::Done);
        if patch.has_container() {
            phase.apply_container(&patch);
        }

        if sent >= chain_len {
            phase.status = phase.final_result();
            return self.check_stage(stage);
        }

        phase.begin_run(index);
        self.dispatch_phase(index, pos);
        Step::Wait
    }

    /// Pop the stage once every phase is terminal; cancel the rest on failure
    fn check_stage(&mut self, stage: &Stage) -> Step {
        if !stage.is_complete(&self.build.phases) {
            return Step::Wait;
        }
        self.stages.pop_front();

        if !stage.is_successful(&self.build.phases) {
            for queued in self.stages.drain(..) {
                for &pos in queued.members() {
                    if let Some(phase) = self.build.phases.get_mut(pos) {
                        phase.status = Status::Canceled;
                    }
                }
            }
            tracing::info!(build_id = %self.build.id, "stage failed, remaining stages canceled");
        }

        self.publish();
        Step::Again
    }

    /// Ad-hoc container update; never touches counters or state
    fn apply_phase_update(&mut self, event: &Event) {
        let Some(patch) = &event.phase else {
            return;
        };
        if !event.is_success() || !patch.has_container() {
            return;
        }
        // Updates may trail their completion, so any token issued for this
        // phase in the running stage is accepted
        if self.state() != Some(FlowState::Run)
            || self.stage_tokens.get(&event.token) != Some(&patch.index)
        {
            tracing::warn!(
                build_id = %self.build.id,
                token = %event.token,
                phase = patch.index,
                "phase update from outside the running stage, dropping"
            );
            return;
        }

        let pos = self.stages.front().and_then(|s| s.position(patch.index));
        let Some(phase) = pos.and_then(|pos| self.build.phases.get_mut(pos)) else {
            return;
        };
        phase.apply_container(patch);
        tracing::debug!(
            build_id = %self.build.id,
            phase = %phase.id,
            container_id = phase.container_id.as_deref().unwrap_or(""),
            "phase updated"
        );
        self.publish();
    }

    fn next_state(&mut self) {
        self.states.pop_front();
        self.dispatched = 0;
        self.pending_step = None;
        self.phase_steps.clear();
        self.pending_phases.clear();
        self.stage_tokens.clear();
        tracing::debug!(build_id = %self.build.id, state = ?self.state(), "state advanced");
    }

    fn end(&mut self) {
        self.states.clear();
        self.pending_step = None;
        self.pending_phases.clear();
        self.stage_tokens.clear();
        self.ended = true;
        tracing::info!(build_id = %self.build.id, status = %self.build.status, "flow ended");
        self.effects.push(FlowEffect::End(self.build.clone()));
    }

    fn mint(&mut self) -> CommandToken {
        self.next_token += 1;
        CommandToken(self.next_token)
    }

    fn dispatch(&mut self, address: Address, command: Command) {
        self.effects.push(FlowEffect::Dispatch { address, command });
    }

    fn publish(&mut self) {
        self.effects
            .push(FlowEffect::PublishSnapshot(self.build.clone()));
    }
}

#[cfg(test)]
#[path = "flow_tests.rs"]
mod tests;

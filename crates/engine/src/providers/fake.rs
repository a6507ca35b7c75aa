// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scriptable provider for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::error::StepError;
use crate::provider::{Provider, StepContext, StepOutput};
use async_trait::async_trait;
use kiln_core::{Capability, Command, Phase, PhasePatch};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

#[derive(Default)]
struct FakeProviderState {
    calls: Vec<Command>,
    stages: Option<Vec<Vec<Phase>>>,
    failure: Option<StepError>,
    phase_failures: HashMap<usize, StepError>,
    containers: HashMap<usize, String>,
    updates: HashMap<usize, String>,
    stalled: bool,
}

/// Provider whose replies are configured up front and whose calls are recorded
///
/// Clones share state, so keep one clone for assertions and register another.
#[derive(Clone)]
pub struct FakeProvider {
    name: String,
    capabilities: Vec<Capability>,
    order: i32,
    state: Arc<Mutex<FakeProviderState>>,
    gate: Arc<watch::Sender<bool>>,
}

impl FakeProvider {
    pub fn new(name: impl Into<String>, capabilities: &[Capability], order: i32) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            name: name.into(),
            capabilities: capabilities.to_vec(),
            order,
            state: Arc::new(Mutex::new(FakeProviderState::default())),
            gate: Arc::new(gate),
        }
    }

    pub fn setup(name: impl Into<String>, order: i32) -> Self {
        Self::new(name, &[Capability::Setup], order)
    }

    pub fn run_phase(name: impl Into<String>, order: i32) -> Self {
        Self::new(name, &[Capability::RunPhase], order)
    }

    pub fn tear_down(name: impl Into<String>, order: i32) -> Self {
        Self::new(name, &[Capability::TearDown], order)
    }

    fn with_state(self, f: impl FnOnce(&mut FakeProviderState)) -> Self {
        f(&mut self.state.lock().unwrap_or_else(|e| e.into_inner()));
        self
    }

    /// Stages returned from setup
    pub fn with_stages(self, stages: Vec<Vec<Phase>>) -> Self {
        self.with_state(|s| s.stages = Some(stages))
    }

    /// Fail every command
    pub fn failing(self, status_code: u16, message: &str) -> Self {
        let err = StepError::new(status_code, message);
        self.with_state(|s| s.failure = Some(err))
    }

    /// Fail run-phase commands for one phase index
    pub fn fail_phase(self, index: usize, status_code: u16, message: &str) -> Self {
        let err = StepError::new(status_code, message);
        self.with_state(|s| {
            s.phase_failures.insert(index, err);
        })
    }

    /// Report a container id on completion of a phase
    pub fn with_container(self, index: usize, id: &str) -> Self {
        let id = id.to_string();
        self.with_state(|s| {
            s.containers.insert(index, id);
        })
    }

    /// Publish an ad-hoc phase update before completing a phase
    pub fn emit_update(self, index: usize, id: &str) -> Self {
        let id = id.to_string();
        self.with_state(|s| {
            s.updates.insert(index, id);
        })
    }

    /// Never reply
    pub fn stalled(self) -> Self {
        self.with_state(|s| s.stalled = true)
    }

    /// Hold every command until [`FakeProvider::release`]
    pub fn held(self) -> Self {
        self.gate.send_replace(false);
        self
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn calls(&self) -> Vec<Command> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .len()
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    fn order(&self) -> i32 {
        self.order
    }

    async fn handle(&self, command: &Command, ctx: &StepContext) -> Result<StepOutput, StepError> {
        let index = command.phase.as_ref().map(|p| p.index);
        let (stalled, update) = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.calls.push(command.clone());
            let update = index.and_then(|i| state.updates.get(&i).cloned());
            (state.stalled, update)
        };

        if let (Some(index), Some(id)) = (index, update) {
            ctx.publish_phase_update(PhasePatch::new(index).container(id));
        }

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        if stalled {
            std::future::pending::<()>().await;
        }

        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(err) = &state.failure {
            return Err(err.clone());
        }

        match command.kind {
            Capability::Setup => Ok(match &state.stages {
                Some(stages) => StepOutput::new().stages(stages.clone()),
                None => StepOutput::new(),
            }),
            Capability::RunPhase => {
                let index = index.unwrap_or_default();
                if let Some(err) = state.phase_failures.get(&index) {
                    return Err(err.clone());
                }
                Ok(match state.containers.get(&index) {
                    Some(id) => StepOutput::new().container(PhasePatch::new(index).container(id.clone())),
                    None => StepOutput::new(),
                })
            }
            Capability::TearDown => Ok(StepOutput::new()),
        }
    }
}

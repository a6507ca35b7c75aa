// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pass-through provider: logs the command and completes it

use crate::error::StepError;
use crate::provider::{Provider, StepContext, StepOutput, DEFAULT_ORDER};
use async_trait::async_trait;
use kiln_core::{Capability, Command};

pub struct EchoProvider {
    name: String,
    capabilities: Vec<Capability>,
    order: i32,
}

impl EchoProvider {
    pub fn new(name: impl Into<String>, capabilities: &[Capability]) -> Self {
        Self {
            name: name.into(),
            capabilities: capabilities.to_vec(),
            order: DEFAULT_ORDER,
        }
    }

    pub fn with_order(self, order: i32) -> Self {
        Self { order, ..self }
    }
}

#[async_trait]
impl Provider for EchoProvider {
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
        tracing::info!(
            provider = %self.name,
            build_id = %ctx.build_id(),
            capability = %command.kind,
            token = %ctx.token(),
            phase = command.phase.as_ref().map(|p| p.id.as_str()),
            "echo"
        );
        Ok(StepOutput::new())
    }
}

#[cfg(test)]
#[path = "echo_tests.rs"]
mod tests;

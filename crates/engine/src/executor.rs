// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effect executor

use crate::bus::Dispatch;
use crate::effect::FlowEffect;
use kiln_adapters::SnapshotStore;
use kiln_core::{Build, BuildId, Capability, CommandToken, Event};
use tracing::Instrument;

/// Status code of a command that could not be handed to its provider
pub const STATUS_UNAVAILABLE: u16 = 503;

/// What carrying out an effect means for the flow that asked for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feedback {
    /// A command left for its provider; its reply is now awaited
    Dispatched {
        build_id: BuildId,
        token: CommandToken,
        capability: Capability,
        phase_index: Option<usize>,
    },
    /// An event to feed straight back into the flow
    Event(Event),
    /// The flow ended with this build
    Ended(Build),
}

/// Executes flow effects against the bus and the snapshot store
pub struct Executor<D, S> {
    dispatch: D,
    store: S,
}

impl<D, S> Executor<D, S>
where
    D: Dispatch,
    S: SnapshotStore,
{
    pub fn new(dispatch: D, store: S) -> Self {
        Self { dispatch, store }
    }

    /// Execute a single effect with tracing
    pub async fn execute(&self, effect: FlowEffect) -> Option<Feedback> {
        let span = tracing::debug_span!("effect", effect = effect.name());
        async move {
            tracing::debug!(fields = ?effect.fields(), "executing");
            let start = std::time::Instant::now();
            let feedback = self.execute_inner(effect).await;
            tracing::debug!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                has_feedback = feedback.is_some(),
                "completed"
            );
            feedback
        }
        .instrument(span)
        .await
    }

    async fn execute_inner(&self, effect: FlowEffect) -> Option<Feedback> {
        match effect {
            FlowEffect::Dispatch { address, command } => {
                let feedback = Feedback::Dispatched {
                    build_id: command.build.id.clone(),
                    token: command.token,
                    capability: command.kind,
                    phase_index: command.phase.as_ref().map(|p| p.index),
                };
                // Keep enough of the command to answer for it on failure
                let reply_to = command.clone();
                match self.dispatch.dispatch(address, command) {
                    Ok(()) => Some(feedback),
                    Err(err) => {
                        tracing::error!(
                            build_id = %reply_to.build.id,
                            %address,
                            token = %reply_to.token,
                            error = %err,
                            "dispatch failed"
                        );
                        Some(Feedback::Event(Event::failed(
                            &reply_to,
                            STATUS_UNAVAILABLE,
                            err.to_string(),
                        )))
                    }
                }
            }

            FlowEffect::PublishSnapshot(build) => {
                // Fire-and-forget: a store failure never stalls the flow
                if let Err(err) = self.store.publish(&build).await {
                    tracing::error!(
                        build_id = %build.id,
                        status = %build.status,
                        error = %err,
                        "snapshot publish failed"
                    );
                }
                None
            }

            FlowEffect::End(build) => Some(Feedback::Ended(build)),
        }
    }

    /// Execute multiple effects in order
    pub async fn execute_all(&self, effects: Vec<FlowEffect>) -> Vec<Feedback> {
        let mut feedback = Vec::new();
        for effect in effects {
            if let Some(item) = self.execute(effect).await {
                feedback.push(item);
            }
        }
        feedback
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;

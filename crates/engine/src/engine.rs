// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine: process-wide coordinator of active flows

use crate::bus::{Dispatch, EventInbox};
use crate::deadline::{Deadline, DeadlineScheduler};
use crate::effect::FlowEffect;
use crate::error::EngineError;
use crate::executor::{Executor, Feedback};
use crate::flow::Flow;
use crate::registry::ProviderChains;
use crate::table::FlowTable;
use kiln_adapters::{ContainerAdapter, SnapshotStore};
use kiln_core::{Build, BuildId, Clock, Event, EventKind, Status};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Flow-end notifications buffered per subscriber
const FLOW_END_CAPACITY: usize = 256;

/// Engine tuning
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Deadline armed for every dispatched command. `None` waits forever.
    pub step_timeout: Option<Duration>,
}

/// Engine collaborator dependencies
pub struct EngineDeps<D, S, K> {
    pub dispatch: D,
    pub store: S,
    pub containers: K,
}

/// Result of aborting an active flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortOutcome {
    /// Containers that were running and should be killed
    pub container_ids: Vec<String>,
    pub build: Build,
}

pub struct Engine<D, S, K, C: Clock> {
    executor: Executor<D, S>,
    containers: K,
    chains: Arc<ProviderChains>,
    flows: FlowTable,
    deadlines: Mutex<DeadlineScheduler>,
    config: EngineConfig,
    clock: C,
    flow_end: broadcast::Sender<Build>,
}

impl<D, S, K, C> Engine<D, S, K, C>
where
    D: Dispatch,
    S: SnapshotStore,
    K: ContainerAdapter,
    C: Clock,
{
    pub fn new(
        deps: EngineDeps<D, S, K>,
        chains: Arc<ProviderChains>,
        clock: C,
        config: EngineConfig,
    ) -> Self {
        let (flow_end, _) = broadcast::channel(FLOW_END_CAPACITY);
        Self {
            executor: Executor::new(deps.dispatch, deps.store),
            containers: deps.containers,
            chains,
            flows: FlowTable::new(),
            deadlines: Mutex::new(DeadlineScheduler::new()),
            config,
            clock,
            flow_end,
        }
    }

    /// Create a flow for a PARKED build and start it
    pub async fn start(
        &self,
        build_id: BuildId,
        mut build: Build,
        script: Option<String>,
    ) -> Result<(), EngineError> {
        if build.status != Status::Parked {
            return Err(EngineError::NotParked {
                build_id,
                status: build.status,
            });
        }
        build.id = build_id.clone();

        let flow = Flow::new(build, script, Arc::clone(&self.chains));
        let handle = self.flows.insert(build_id.clone(), flow)?;

        let mut flow = handle.lock().await;
        let effects = flow.start(self.clock.utc_now());
        self.apply(&mut flow, effects).await;
        Ok(())
    }

    /// Cancel an active build. `None` when no flow is active for it.
    ///
    /// The flow unwinds on its next event; running containers are killed
    /// here on a best-effort basis.
    pub async fn abort(&self, build_id: &BuildId) -> Option<AbortOutcome> {
        let Some(handle) = self.flows.get(build_id) else {
            tracing::info!(%build_id, "abort for inactive build, ignoring");
            return None;
        };

        let mut flow = handle.lock().await;
        let first = !flow.is_aborted();
        let container_ids = flow.abort(self.clock.utc_now());
        let build = flow.build().clone();
        if first {
            self.apply(&mut flow, vec![FlowEffect::PublishSnapshot(build.clone())])
                .await;
        }
        drop(flow);

        if !container_ids.is_empty() {
            if let Err(err) = self.containers.kill(&container_ids).await {
                tracing::error!(%build_id, error = %err, "container kill failed");
            }
        }

        Some(AbortOutcome {
            container_ids,
            build,
        })
    }

    /// Clean up every container a build ever used. Never touches active flows.
    pub async fn delete(&self, build: &Build) {
        let ids = build.all_container_ids();
        tracing::info!(build_id = %build.id, containers = ids.len(), "build deleted");
        if ids.is_empty() {
            return;
        }
        if let Err(err) = self.containers.delete(&ids).await {
            tracing::error!(build_id = %build.id, error = %err, "container delete failed");
        }
    }

    /// Route a completion event to the flow that owns its build
    pub async fn on_completion_event(&self, event: Event) -> Result<(), EngineError> {
        event.validate()?;
        let build_id = event.build_id.clone();
        let handle = self
            .flows
            .get(&build_id)
            .ok_or_else(|| EngineError::FlowNotFound(build_id.clone()))?;

        let mut flow = handle.lock().await;
        // Only a reply the flow will take answers its command
        if event.kind != EventKind::PhaseUpdate && flow.accepts(&event) {
            self.deadlines
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .cancel(&build_id, event.token);
        }
        let effects = flow.process(event, self.clock.utc_now());
        self.apply(&mut flow, effects).await;
        Ok(())
    }

    /// Evict a finished flow and announce it
    pub fn on_flow_end(&self, build: Build) {
        if self.flows.remove(&build.id).is_none() {
            return;
        }
        self.deadlines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel_build(&build.id);
        tracing::info!(build_id = %build.id, status = %build.status, "flow evicted");
        // No subscribers is fine
        let _ = self.flow_end.send(build);
    }

    /// Fail every step whose deadline has passed. Returns how many fired.
    pub async fn fire_deadlines(&self) -> usize {
        let expired = self
            .deadlines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .poll(self.clock.now());

        let fired = expired.len();
        for deadline in expired {
            tracing::warn!(
                build_id = %deadline.build_id,
                capability = %deadline.capability,
                token = %deadline.token,
                "step deadline passed"
            );
            if let Err(err) = self.on_completion_event(deadline.expired_event()).await {
                tracing::debug!(error = %err, "expired step no longer routable");
            }
        }
        fired
    }

    /// Current build of an active flow
    pub async fn snapshot(&self, build_id: &BuildId) -> Option<Build> {
        let handle = self.flows.get(build_id)?;
        let flow = handle.lock().await;
        Some(flow.build().clone())
    }

    pub fn active_flows(&self) -> Vec<BuildId> {
        self.flows.ids()
    }

    pub fn subscribe_flow_end(&self) -> broadcast::Receiver<Build> {
        self.flow_end.subscribe()
    }

    pub fn pending_deadlines(&self) -> usize {
        self.deadlines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Route events from the bus until every publisher is gone
    pub async fn run(self: Arc<Self>, mut inbox: EventInbox) {
        while let Some(event) = inbox.recv().await {
            let engine = Arc::clone(&self);
            tokio::spawn(async move {
                let kind = event.kind;
                let build_id = event.build_id.clone();
                if let Err(err) = engine.on_completion_event(event).await {
                    tracing::warn!(%build_id, %kind, error = %err, "event not routed");
                }
            });
        }
        tracing::info!("event inbox closed");
    }

    /// Carry out a flow's effects, feeding synthetic events back until it settles
    async fn apply(&self, flow: &mut Flow, effects: Vec<FlowEffect>) {
        let mut queue: VecDeque<FlowEffect> = effects.into();
        let mut ended = None;

        while let Some(effect) = queue.pop_front() {
            match self.executor.execute(effect).await {
                Some(Feedback::Dispatched {
                    build_id,
                    token,
                    capability,
                    phase_index,
                }) => {
                    if let Some(timeout) = self.config.step_timeout {
                        self.deadlines
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .schedule(Deadline {
                                build_id,
                                token,
                                capability,
                                phase_index,
                                fire_at: self.clock.now() + timeout,
                                timeout,
                            });
                    }
                }
                Some(Feedback::Event(event)) => {
                    queue.extend(flow.process(event, self.clock.utc_now()));
                }
                Some(Feedback::Ended(build)) => ended = Some(build),
                None => {}
            }
        }

        if let Some(build) = ended {
            self.on_flow_end(build);
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;

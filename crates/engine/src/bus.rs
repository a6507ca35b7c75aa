// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed in-process message bus
//!
//! Commands are point-to-point: each provider slot owns one mailbox keyed by
//! its [`Address`]. Completion events are shared: every provider of a
//! capability publishes into the same channel, and ad-hoc phase updates have
//! a channel of their own.

use crate::error::{DispatchError, StepError};
use crate::provider::{completion_event, Provider, StepContext};
use crate::registry::ProviderRegistry;
use kiln_core::{Address, Command, Event, EventKind};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Hands a command to the provider at an address
pub trait Dispatch: Clone + Send + Sync + 'static {
    fn dispatch(&self, address: Address, command: Command) -> Result<(), DispatchError>;
}

/// Publishing side of the shared event channels
#[derive(Clone)]
pub struct EventOutlet {
    setup_end: mpsc::UnboundedSender<Event>,
    phase_end: mpsc::UnboundedSender<Event>,
    tear_down_end: mpsc::UnboundedSender<Event>,
    phase_update: mpsc::UnboundedSender<Event>,
}

impl EventOutlet {
    pub fn channel() -> (EventOutlet, EventInbox) {
        let (setup_tx, setup_rx) = mpsc::unbounded_channel();
        let (phase_tx, phase_rx) = mpsc::unbounded_channel();
        let (tear_down_tx, tear_down_rx) = mpsc::unbounded_channel();
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            EventOutlet {
                setup_end: setup_tx,
                phase_end: phase_tx,
                tear_down_end: tear_down_tx,
                phase_update: update_tx,
            },
            EventInbox {
                setup_end: setup_rx,
                phase_end: phase_rx,
                tear_down_end: tear_down_rx,
                phase_update: update_rx,
            },
        )
    }

    pub fn publish(&self, event: Event) {
        let tx = match event.kind {
            EventKind::SetupEnd => &self.setup_end,
            EventKind::PhaseEnd => &self.phase_end,
            EventKind::TearDownEnd => &self.tear_down_end,
            EventKind::PhaseUpdate => &self.phase_update,
        };
        if let Err(err) = tx.send(event) {
            tracing::warn!(
                kind = %err.0.kind,
                build_id = %err.0.build_id,
                "event inbox closed, dropping event"
            );
        }
    }
}

/// Receiving side of the shared event channels
pub struct EventInbox {
    setup_end: mpsc::UnboundedReceiver<Event>,
    phase_end: mpsc::UnboundedReceiver<Event>,
    tear_down_end: mpsc::UnboundedReceiver<Event>,
    phase_update: mpsc::UnboundedReceiver<Event>,
}

impl EventInbox {
    /// Next event from any channel; `None` once every publisher is gone
    pub async fn recv(&mut self) -> Option<Event> {
        tokio::select! {
            Some(event) = self.setup_end.recv() => Some(event),
            Some(event) = self.phase_end.recv() => Some(event),
            Some(event) = self.tear_down_end.recv() => Some(event),
            Some(event) = self.phase_update.recv() => Some(event),
            else => None,
        }
    }
}

/// Bus with one hosted task per provider slot
#[derive(Clone)]
pub struct Bus {
    mailboxes: Arc<HashMap<Address, mpsc::UnboundedSender<Command>>>,
    outlet: EventOutlet,
}

impl Bus {
    /// Spawn a host for every registered slot. Must run inside a tokio runtime.
    pub fn launch(registry: &ProviderRegistry) -> (Bus, EventInbox) {
        let (outlet, inbox) = EventOutlet::channel();
        let mut mailboxes = HashMap::new();

        for (address, provider) in registry.slots() {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(host(address, provider, rx, outlet.clone()));
            mailboxes.insert(address, tx);
        }

        (
            Bus {
                mailboxes: Arc::new(mailboxes),
                outlet,
            },
            inbox,
        )
    }

    pub fn outlet(&self) -> EventOutlet {
        self.outlet.clone()
    }
}

impl Dispatch for Bus {
    fn dispatch(&self, address: Address, command: Command) -> Result<(), DispatchError> {
        let tx = self
            .mailboxes
            .get(&address)
            .ok_or(DispatchError::NoMailbox(address))?;
        tx.send(command).map_err(|_| DispatchError::Closed(address))
    }
}

/// Serve one mailbox. Each command is handled on its own task so sibling
/// phases sent to the same provider run in parallel.
async fn host(
    address: Address,
    provider: Arc<dyn Provider>,
    mut rx: mpsc::UnboundedReceiver<Command>,
    outlet: EventOutlet,
) {
    while let Some(command) = rx.recv().await {
        let provider = Arc::clone(&provider);
        let outlet = outlet.clone();
        tokio::spawn(async move {
            let ctx = StepContext::new(command.build.id.clone(), command.token, outlet.clone());
            let step = {
                let command = command.clone();
                let provider = Arc::clone(&provider);
                tokio::spawn(async move { provider.handle(&command, &ctx).await })
            };
            let result = match step.await {
                Ok(result) => result,
                Err(err) => {
                    tracing::error!(
                        provider = provider.name(),
                        %address,
                        error = %err,
                        "provider task aborted"
                    );
                    Err(StepError::internal(format!("provider {} crashed", provider.name())))
                }
            };
            outlet.publish(completion_event(&command, result));
        });
    }
    tracing::debug!(%address, "mailbox closed");
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeDispatch;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    #![cfg_attr(coverage_nightly, coverage(off))]

    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeDispatchState {
        sent: Vec<(Address, Command)>,
        closed: HashSet<Address>,
    }

    /// Records dispatched commands instead of delivering them
    #[derive(Clone, Default)]
    pub struct FakeDispatch {
        inner: Arc<Mutex<FakeDispatchState>>,
    }

    impl FakeDispatch {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make dispatches to `address` fail as if its mailbox were closed
        pub fn close(&self, address: Address) {
            self.inner
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .closed
                .insert(address);
        }

        pub fn sent(&self) -> Vec<(Address, Command)> {
            self.inner
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .sent
                .clone()
        }

        /// Drain recorded commands
        pub fn take(&self) -> Vec<(Address, Command)> {
            std::mem::take(&mut self.inner.lock().unwrap_or_else(|e| e.into_inner()).sent)
        }
    }

    impl Dispatch for FakeDispatch {
        fn dispatch(&self, address: Address, command: Command) -> Result<(), DispatchError> {
            let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if state.closed.contains(&address) {
                return Err(DispatchError::Closed(address));
            }
            state.sent.push((address, command));
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;

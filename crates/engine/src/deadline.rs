// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-step deadlines
//!
//! Every dispatched command can arm a deadline. When it passes before the
//! reply arrives, the engine feeds a synthetic failure back into the flow.

use kiln_core::{BuildId, Capability, CommandToken, Event, EventKind, PhasePatch};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::time::{Duration, Instant};

/// Status code of a step that timed out
pub const STATUS_TIMEOUT: u16 = 504;

/// Command awaiting a reply before `fire_at`
#[derive(Debug, Clone)]
pub struct Deadline {
    pub build_id: BuildId,
    pub token: CommandToken,
    pub capability: Capability,
    pub phase_index: Option<usize>,
    pub fire_at: Instant,
    pub timeout: Duration,
}

impl Deadline {
    fn key(&self) -> (BuildId, CommandToken) {
        (self.build_id.clone(), self.token)
    }

    /// Failure event standing in for the reply that never came
    pub fn expired_event(&self) -> Event {
        let kind = self.capability.completion();
        let mut event = Event {
            kind,
            build_id: self.build_id.clone(),
            token: self.token,
            status_code: STATUS_TIMEOUT,
            status_message: Some(format!(
                "{} step timed out after {}s",
                self.capability,
                self.timeout.as_secs()
            )),
            workspace: None,
            repository: None,
            child_repository: None,
            phase: None,
            stages: None,
        };
        if kind == EventKind::PhaseEnd {
            event.phase = Some(PhasePatch::new(self.phase_index.unwrap_or_default()));
        }
        event
    }
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.key() == other.key()
    }
}

impl Eq for Deadline {}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Min-heap: earliest first; the key breaks ties so Ord agrees with Eq
        Reverse((self.fire_at, self.key())).cmp(&Reverse((other.fire_at, other.key())))
    }
}

/// Timer heap of outstanding deadlines
#[derive(Default)]
pub struct DeadlineScheduler {
    items: BinaryHeap<Deadline>,
    cancelled: HashSet<(BuildId, CommandToken)>,
}

impl DeadlineScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, deadline: Deadline) {
        self.cancelled.remove(&deadline.key());
        self.items.push(deadline);
    }

    /// The reply arrived; the deadline will never fire
    pub fn cancel(&mut self, build_id: &BuildId, token: CommandToken) {
        let key = (build_id.clone(), token);
        if self.items.iter().any(|d| d.key() == key) {
            self.cancelled.insert(key);
        }
    }

    /// Drop every deadline of a finished build
    pub fn cancel_build(&mut self, build_id: &BuildId) {
        self.items.retain(|d| &d.build_id != build_id);
        self.cancelled.retain(|(id, _)| id != build_id);
    }

    /// Deadlines at or before `now`, earliest first
    pub fn poll(&mut self, now: Instant) -> Vec<Deadline> {
        let mut ready = Vec::new();

        while let Some(item) = self.items.peek() {
            if item.fire_at > now {
                break;
            }

            let Some(item) = self.items.pop() else {
                break;
            };

            if self.cancelled.remove(&item.key()) {
                continue;
            }

            ready.push(item);
        }

        ready
    }

    pub fn len(&self) -> usize {
        self.items.len() - self.cancelled.len().min(self.items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "deadline_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stage: phases that run in parallel
//!
//! A stage does not own its phases. It holds positions into the build's
//! flat phase list so every mutation lands on the persisted snapshot.

use crate::phase::Phase;
use crate::status::Status;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stage {
    members: Vec<usize>,
}

impl Stage {
    pub fn new(members: Vec<usize>) -> Self {
        Self { members }
    }

    /// Build-level positions, ordered by phase index
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Build-level position of the phase at `index` within this stage
    pub fn position(&self, index: usize) -> Option<usize> {
        self.members.get(index).copied()
    }

    pub fn phases<'a>(&'a self, all: &'a [Phase]) -> impl Iterator<Item = &'a Phase> + 'a {
        self.members.iter().filter_map(move |&pos| all.get(pos))
    }

    pub fn is_complete(&self, all: &[Phase]) -> bool {
        self.phases(all).all(|p| p.final_result().is_terminal())
    }

    pub fn is_successful(&self, all: &[Phase]) -> bool {
        self.phases(all).all(|p| p.final_result() == Status::Done)
    }
}

#[cfg(test)]
#[path = "stage_tests.rs"]
mod tests;

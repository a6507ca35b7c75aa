// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! kiln-core: domain model for the kiln pipeline runner
//!
//! This crate provides:
//! - Build, phase and stage types with their status rules
//! - The command/event envelopes exchanged with capability providers
//! - A clock abstraction for deterministic tests

pub mod clock;
pub mod status;

pub mod build;
pub mod message;
pub mod phase;
pub mod repository;
pub mod stage;

mod error;

pub use build::{Build, BuildId};
pub use clock::{Clock, FakeClock, SystemClock};
pub use error::ModelError;
pub use message::{
    Address, Capability, Command, CommandToken, Event, EventKind, STATUS_OK,
};
pub use phase::{Phase, PhasePatch};
pub use repository::{Repository, RepositoryKind, Workspace};
pub use stage::Stage;
pub use status::Status;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Kiln pipeline execution engine

mod bus;
mod deadline;
mod effect;
mod engine;
mod error;
mod executor;
mod flow;
mod provider;
pub mod providers;
mod registry;
mod table;

pub use bus::{Bus, Dispatch, EventInbox, EventOutlet};
pub use deadline::{Deadline, DeadlineScheduler, STATUS_TIMEOUT};
pub use effect::FlowEffect;
pub use engine::{AbortOutcome, Engine, EngineConfig, EngineDeps};
pub use error::{DispatchError, EngineError, StepError};
pub use executor::{Executor, Feedback, STATUS_UNAVAILABLE};
pub use flow::{Flow, FlowState};
pub use provider::{completion_event, Provider, StepContext, StepOutput, DEFAULT_ORDER};
pub use providers::EchoProvider;
pub use registry::{ProviderChains, ProviderRegistry};
pub use table::{FlowHandle, FlowTable};

#[cfg(any(test, feature = "test-support"))]
pub use bus::FakeDispatch;
#[cfg(any(test, feature = "test-support"))]
pub use providers::FakeProvider;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine

use kiln_core::{Address, BuildId, ModelError, Status};
use thiserror::Error;

/// Errors returned by engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("build {0} already has an active flow")]
    AlreadyActive(BuildId),
    #[error("build {build_id} is {status}; only PARKED builds can start")]
    NotParked { build_id: BuildId, status: Status },
    #[error("no active flow for build {0}")]
    FlowNotFound(BuildId),
    #[error("invalid event: {0}")]
    InvalidEvent(#[from] ModelError),
}

/// Errors raised while handing a command to a provider
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("no provider listening at {0}")]
    NoMailbox(Address),
    #[error("mailbox at {0} is closed")]
    Closed(Address),
}

/// Failure reported by a provider while handling a command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (status {status_code})")]
pub struct StepError {
    pub status_code: u16,
    pub message: String,
}

impl StepError {
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }

    /// Generic provider failure (status 500)
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, message)
    }
}

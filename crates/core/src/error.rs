// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Validation errors for the domain model

use thiserror::Error;

/// Errors raised when parsing or validating model values at ingress
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("unknown status: {0}")]
    UnknownStatus(String),
    #[error("unknown capability: {0}")]
    UnknownCapability(String),
    #[error("{field} must not be blank")]
    Blank { field: &'static str },
    #[error("{kind} event for build {build_id} carries no phase")]
    MissingPhase { kind: String, build_id: String },
    #[error("{kind} event for build {build_id} cannot carry stages")]
    UnexpectedStages { kind: String, build_id: String },
    #[error("status code {0} is out of range")]
    InvalidStatusCode(u16),
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Kiln daemon library: configuration, lifecycle, and the socket protocol

pub mod config;
pub mod lifecycle;
pub mod logging;
pub mod protocol;
pub mod server;

pub use config::{Config, ConfigError, ProviderKind, ProviderSpec};
pub use lifecycle::{startup, startup_with_providers, DaemonEngine, DaemonState, LifecycleError};
pub use protocol::{ProtocolError, Request, Response};
pub use server::ServerError;

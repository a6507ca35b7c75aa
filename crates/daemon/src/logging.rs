// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon log file setup.
//!
//! Lines written here bypass tracing so they land in the file even when the
//! non-blocking writer has not flushed (or was never installed).

use std::io::Write;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::lifecycle::LifecycleError;

/// Every daemon start appends `--- kilnd: starting (pid: N) ---`
pub const STARTUP_MARKER_PREFIX: &str = "--- kilnd: starting (pid: ";

/// Filter used when `RUST_LOG` is unset or invalid
const DEFAULT_FILTER: &str = "info";

fn append_line(log_path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    writeln!(file, "{line}")
}

pub fn write_startup_marker(log_path: &Path) -> Result<(), LifecycleError> {
    append_line(
        log_path,
        &format!("{STARTUP_MARKER_PREFIX}{}) ---", std::process::id()),
    )?;
    Ok(())
}

/// Best effort; a startup failure is already being reported to the caller
pub fn write_startup_error(log_path: &Path, error: &LifecycleError) {
    let _ = append_line(log_path, &format!("ERROR kilnd failed to start: {error}"));
}

/// Install the global subscriber. Keep the guard alive until exit.
pub fn init(log_path: &Path) -> Result<WorkerGuard, LifecycleError> {
    let (Some(dir), Some(file_name)) = (log_path.parent(), log_path.file_name()) else {
        return Err(LifecycleError::NoStateDir);
    };
    std::fs::create_dir_all(dir)?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(
        dir, file_name,
    ));
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();
    Ok(guard)
}

#[cfg(test)]
#[path = "logging_tests.rs"]
mod tests;

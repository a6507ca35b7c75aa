// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup and shutdown.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use fs2::FileExt;
use kiln_adapters::{
    DockerCliAdapter, MemorySnapshotStore, TracedContainerAdapter, TracedSnapshotStore,
};
use kiln_core::SystemClock;
use kiln_engine::{Bus, Engine, EngineDeps, Provider, ProviderRegistry};
use thiserror::Error;
use tokio::net::UnixListener;
use tracing::{info, warn};

use crate::config::Config;

/// Engine with the daemon's concrete collaborators (wrapped with tracing)
pub type DaemonEngine = Engine<
    Bus,
    TracedSnapshotStore<MemorySnapshotStore>,
    TracedContainerAdapter<DockerCliAdapter>,
    SystemClock,
>;

/// Daemon state during operation
pub struct DaemonState {
    pub config: Config,
    /// Holds the exclusive lock until the state is dropped
    #[allow(dead_code)]
    lock_file: File,
    pub listener: UnixListener,
    pub engine: Arc<DaemonEngine>,
    /// Latest snapshot of every build, finished ones included
    pub store: MemorySnapshotStore,
    pub start_time: Instant,
    /// Set by a `Shutdown` request; the serve loop exits once it sees it
    pub shutdown_requested: bool,
}

impl DaemonState {
    /// Fail steps that outlived their deadline
    pub async fn check_deadlines(&self) {
        let fired = self.engine.fire_deadlines().await;
        if fired > 0 {
            info!(fired, "step deadlines fired");
        }
    }

    /// Shutdown the daemon gracefully
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        info!(flows_active = self.engine.active_flows().len(), "shutting down daemon");

        remove_if_exists(&self.config.socket_path, "socket");
        remove_if_exists(&self.config.lock_path, "PID");
        remove_if_exists(&self.config.version_path, "version");

        info!("daemon shutdown complete");
        Ok(())
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Start the daemon with the configured providers. Must run inside a tokio runtime.
pub async fn startup(config: &Config) -> Result<DaemonState, LifecycleError> {
    startup_with_providers(config, config.build_providers()).await
}

/// Start the daemon hosting the given providers
pub async fn startup_with_providers(
    config: &Config,
    providers: Vec<Arc<dyn Provider>>,
) -> Result<DaemonState, LifecycleError> {
    match startup_inner(config, providers).await {
        Ok(state) => Ok(state),
        // Files behind a held lock belong to the running daemon
        Err(e @ LifecycleError::LockFailed(_)) => Err(e),
        Err(e) => {
            cleanup_on_failure(config);
            Err(e)
        }
    }
}

async fn startup_inner(
    config: &Config,
    providers: Vec<Arc<dyn Provider>>,
) -> Result<DaemonState, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;
    let lock_file = acquire_lock(config)?;
    std::fs::write(&config.version_path, env!("CARGO_PKG_VERSION"))?;

    let registry = ProviderRegistry::new(providers);
    info!(providers = ?registry.names(), "providers registered");
    let (bus, inbox) = Bus::launch(&registry);

    let store = MemorySnapshotStore::new();
    let engine = Arc::new(Engine::new(
        EngineDeps {
            dispatch: bus,
            store: TracedSnapshotStore::new(store.clone()),
            containers: TracedContainerAdapter::new(DockerCliAdapter::new()),
        },
        registry.chains(),
        SystemClock,
        config.engine.clone(),
    ));
    tokio::spawn(Arc::clone(&engine).run(inbox));
    tokio::spawn(log_flow_ends(engine.subscribe_flow_end()));

    // Clients treat a connectable socket as a ready daemon, so bind last
    let listener = bind_socket(&config.socket_path)?;
    info!(state_dir = %config.state_dir.display(), "daemon started");

    Ok(DaemonState {
        config: config.clone(),
        lock_file,
        listener,
        engine,
        store,
        start_time: Instant::now(),
        shutdown_requested: false,
    })
}

/// Take the exclusive lock, then record our pid in the lock file.
///
/// The file is opened without truncation: a running daemon's pid must
/// survive a failed attempt to start a second one.
fn acquire_lock(config: &Config) -> Result<File, LifecycleError> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&config.lock_path)?;
    file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(file)
}

/// Bind the listener, replacing a socket left behind by a dead daemon
fn bind_socket(path: &Path) -> Result<UnixListener, LifecycleError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    UnixListener::bind(path).map_err(|e| LifecycleError::BindFailed(path.to_path_buf(), e))
}

async fn log_flow_ends(mut ends: tokio::sync::broadcast::Receiver<kiln_core::Build>) {
    use tokio::sync::broadcast::error::RecvError;

    loop {
        match ends.recv().await {
            Ok(build) => info!(
                build_id = %build.id,
                status = %build.status,
                phases = build.phases.len(),
                "build finished"
            ),
            Err(RecvError::Lagged(missed)) => warn!(missed, "flow-end log lagged"),
            Err(RecvError::Closed) => return,
        }
    }
}

/// Undo a partial startup
fn cleanup_on_failure(config: &Config) {
    for path in [&config.socket_path, &config.version_path, &config.lock_path] {
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn remove_if_exists(path: &Path, what: &str) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "failed to remove {what} file");
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! kilnd: hosts the engine and its providers behind a Unix socket.
//!
//! Usage: `kilnd [CONFIG]`. Without an argument the config path comes from
//! `KILN_CONFIG`, falling back to built-in defaults.

use std::path::PathBuf;
use std::time::Duration;

use kiln_daemon::{logging, server, startup, Config, DaemonState, LifecycleError};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

/// How often expired step deadlines are collected
const DEADLINE_TICK: Duration = Duration::from_secs(1);

#[derive(Debug)]
enum Stop {
    Signal(&'static str),
    Requested,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(std::env::args().nth(1).map(PathBuf::from).as_deref())?;

    logging::write_startup_marker(&config.log_path)?;
    let _log_guard = logging::init(&config.log_path)?;

    let mut daemon = match startup(&config).await {
        Ok(daemon) => daemon,
        Err(e) => {
            logging::write_startup_error(&config.log_path, &e);
            error!(error = %e, "startup failed");
            return Err(e.into());
        }
    };

    info!(
        socket = %config.socket_path.display(),
        providers = config.providers.len(),
        step_timeout = ?config.engine.step_timeout,
        "kilnd ready"
    );
    // A supervising parent waits for this line on stdout
    println!("READY");

    match serve(&mut daemon).await? {
        Stop::Signal(name) => info!(signal = name, "stopping"),
        Stop::Requested => info!("shutdown requested by client"),
    }
    daemon.shutdown().await?;
    info!("kilnd stopped");
    Ok(())
}

async fn serve(daemon: &mut DaemonState) -> Result<Stop, LifecycleError> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut tick = tokio::time::interval(DEADLINE_TICK);

    while !daemon.shutdown_requested {
        tokio::select! {
            accepted = daemon.listener.accept() => match accepted {
                Ok((stream, _)) => {
                    if let Err(e) = server::handle_connection(daemon, stream).await {
                        warn!(error = %e, "connection failed");
                    }
                }
                Err(e) => error!(error = %e, "accept failed"),
            },
            _ = tick.tick() => daemon.check_deadlines().await,
            _ = sigterm.recv() => return Ok(Stop::Signal("SIGTERM")),
            _ = sigint.recv() => return Ok(Stop::Signal("SIGINT")),
        }
    }
    Ok(Stop::Requested)
}

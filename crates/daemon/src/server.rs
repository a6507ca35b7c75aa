// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket server and connection handling.

use std::sync::Arc;

use kiln_core::{Build, BuildId, Status};
use tokio::net::UnixStream;
use tracing::{debug, error, info};

use crate::lifecycle::DaemonState;
use crate::protocol::{self, Request, Response, DEFAULT_TIMEOUT, PROTOCOL_VERSION};

/// Handle a single client connection
pub async fn handle_connection(
    daemon: &mut DaemonState,
    stream: UnixStream,
) -> Result<(), ServerError> {
    let (mut reader, mut writer) = stream.into_split();

    let request = match protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await {
        Ok(req) => req,
        Err(protocol::ProtocolError::Timeout) => {
            error!("Request read timeout");
            return Err(ServerError::Timeout);
        }
        Err(protocol::ProtocolError::ConnectionClosed) => {
            debug!("Client disconnected before sending request");
            return Ok(());
        }
        Err(e) => {
            error!("Failed to read request: {}", e);
            return Err(ServerError::Protocol(e));
        }
    };

    debug!(?request, "received request");
    let response = handle_request(daemon, request).await;
    debug!(?response, "sending response");

    protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT)
        .await
        .map_err(ServerError::Protocol)?;

    Ok(())
}

/// Handle a single request and return a response
pub async fn handle_request(daemon: &mut DaemonState, request: Request) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::Hello { version: _ } => Response::Hello {
            version: PROTOCOL_VERSION.to_string(),
        },

        Request::Start {
            build_id,
            build,
            script,
        } => match daemon.engine.start(build_id.clone(), build, script).await {
            Ok(()) => Response::Started { build_id },
            Err(e) => error_response(e),
        },

        Request::Abort { build_id } => handle_abort(daemon, build_id).await,

        Request::Delete { build } => handle_delete(daemon, build),

        Request::Status => Response::Status {
            uptime_secs: daemon.start_time.elapsed().as_secs(),
            flows_active: daemon.engine.active_flows().len(),
        },

        Request::GetBuild { build_id } => {
            // Active flows hold the freshest copy; finished builds live in the store
            let build = match daemon.engine.snapshot(&build_id).await {
                Some(build) => Some(build),
                None => daemon.store.get(&build_id),
            };
            Response::Build {
                build: build.map(Box::new),
            }
        }

        Request::Shutdown => {
            daemon.shutdown_requested = true;
            Response::ShuttingDown
        }
    }
}

async fn handle_abort(daemon: &DaemonState, build_id: BuildId) -> Response {
    let Some(current) = daemon.engine.snapshot(&build_id).await else {
        return Response::NotActive { build_id };
    };
    if !current.can_abort() {
        return error_response(ServerError::NotAbortable {
            build_id,
            status: current.status,
        });
    }

    match daemon.engine.abort(&build_id).await {
        Some(outcome) => {
            info!(%build_id, containers = outcome.container_ids.len(), "build aborted");
            Response::Aborted {
                container_ids: outcome.container_ids,
                build: outcome.build,
            }
        }
        None => Response::NotActive { build_id },
    }
}

fn handle_delete(daemon: &DaemonState, build: Build) -> Response {
    if !build.can_delete() {
        return error_response(ServerError::NotDeletable {
            build_id: build.id.clone(),
            status: build.status,
        });
    }

    let build_id = build.id.clone();
    daemon.store.remove(&build_id);
    let engine = Arc::clone(&daemon.engine);
    tokio::spawn(async move { engine.delete(&build).await });
    Response::DeleteAccepted { build_id }
}

fn error_response(err: impl std::fmt::Display) -> Response {
    Response::Error {
        message: err.to_string(),
    }
}

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("Request timeout")]
    Timeout,

    #[error("build {build_id} is {status} and cannot be aborted")]
    NotAbortable { build_id: BuildId, status: Status },

    #[error("build {build_id} is {status}; only finished builds can be deleted")]
    NotDeletable { build_id: BuildId, status: Status },
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;

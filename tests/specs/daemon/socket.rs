// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A client drives a build through the daemon socket

use crate::prelude::*;
use kiln_daemon::protocol::{round_trip, DEFAULT_TIMEOUT};
use kiln_daemon::server::handle_connection;
use kiln_daemon::{startup, Config, DaemonState, Request, Response};
use std::path::{Path, PathBuf};
use tokio::net::UnixStream;

fn config(dir: &Path) -> Config {
    let text = format!(
        "state_dir = {:?}\nsocket_path = {:?}\n",
        dir.join("state"),
        dir.join("kilnd.sock"),
    );
    Config::from_toml(&text).unwrap()
}

/// Accept connections until a client asks for shutdown
async fn serve(mut daemon: DaemonState) {
    while !daemon.shutdown_requested {
        let (stream, _) = daemon.listener.accept().await.unwrap();
        handle_connection(&mut daemon, stream).await.unwrap();
    }
    daemon.shutdown().await.unwrap();
}

async fn send(socket: &PathBuf, request: Request) -> Response {
    let mut stream = UnixStream::connect(socket).await.unwrap();
    round_trip(&mut stream, &request, DEFAULT_TIMEOUT)
        .await
        .unwrap()
}

#[tokio::test]
async fn build_runs_to_done_and_daemon_shuts_down_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let daemon = startup(&config).await.unwrap();
    let socket = config.socket_path.clone();
    let server = tokio::spawn(serve(daemon));

    let started = send(
        &socket,
        Request::Start {
            build_id: BuildId::from("b-1"),
            build: parked("b-1"),
            script: Some("make".into()),
        },
    )
    .await;
    assert_eq!(
        started,
        Response::Started {
            build_id: BuildId::from("b-1")
        }
    );

    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let response = send(
            &socket,
            Request::GetBuild {
                build_id: BuildId::from("b-1"),
            },
        )
        .await;
        if let Response::Build { build: Some(build) } = response {
            if build.status == Status::Done {
                break;
            }
        }
        assert!(tokio::time::Instant::now() < deadline, "build never finished");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let Response::Status { flows_active, .. } = send(&socket, Request::Status).await else {
        panic!("expected Status");
    };
    assert_eq!(flows_active, 0);

    assert_eq!(send(&socket, Request::Shutdown).await, Response::ShuttingDown);
    server.await.unwrap();

    assert!(!config.socket_path.exists());
    assert!(!config.lock_path.exists());
}

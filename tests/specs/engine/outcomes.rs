// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Which builds start, how they fail, and what abort returns

use crate::prelude::*;

#[tokio::test]
async fn only_parked_builds_start() {
    let pipeline = Pipeline::with(&[FakeProvider::setup("checkout", 10)]);

    for status in [Status::InFlight, Status::Done, Status::Failed, Status::Canceled] {
        let mut build = parked("b-1");
        build.status = status;
        let err = pipeline
            .engine
            .start(BuildId::from("b-1"), build, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotParked { .. }), "{status} started");
    }
    assert!(pipeline.engine.active_flows().is_empty());
}

#[tokio::test]
async fn a_build_has_at_most_one_active_flow() {
    let setup = FakeProvider::setup("checkout", 10).held();
    let pipeline = Pipeline::with(&[setup.clone()]);

    pipeline.start("b-1").await;
    let err = pipeline
        .engine
        .start(BuildId::from("b-1"), parked("b-1"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::AlreadyActive(_)));
    assert_eq!(pipeline.engine.active_flows(), vec![BuildId::from("b-1")]);
    setup.release();
}

#[tokio::test]
async fn setup_failure_skips_the_rest_of_setup_and_tears_down() {
    let broken = FakeProvider::setup("checkout", 10).failing(500, "clone failed");
    let skipped = FakeProvider::setup("cache", 20);
    let run = FakeProvider::run_phase("shell", 30);
    let tear_down = FakeProvider::tear_down("cleanup", 40);
    let mut pipeline = Pipeline::with(&[broken, skipped.clone(), run.clone(), tear_down.clone()]);

    pipeline.start("b-1").await;
    let build = pipeline.finished().await;

    assert_eq!(build.status, Status::Failed);
    assert_eq!(build.status_message.as_deref(), Some("clone failed"));
    assert_eq!(skipped.call_count(), 0);
    assert_eq!(run.call_count(), 0);
    assert_eq!(tear_down.call_count(), 1);
}

#[tokio::test]
async fn a_failed_phase_stops_its_own_chain_only() {
    let setup = FakeProvider::setup("checkout", 10).with_stages(vec![stage(&["lint", "test"])]);
    let first = FakeProvider::run_phase("prepare", 20).fail_phase(0, 500, "no image");
    let second = FakeProvider::run_phase("shell", 30);
    let mut pipeline = Pipeline::with(&[setup, first.clone(), second.clone()]);

    pipeline.start("b-1").await;
    let build = pipeline.finished().await;

    assert_eq!(
        statuses(&build),
        vec![("lint".into(), Status::Failed), ("test".into(), Status::Done)]
    );
    let continued: Vec<usize> = second
        .calls()
        .iter()
        .filter_map(|c| c.phase.as_ref().map(|p| p.index))
        .collect();
    assert_eq!(continued, vec![1]);
    assert_eq!(build.status, Status::Failed);
}

#[tokio::test]
async fn abort_is_idempotent() {
    let setup = FakeProvider::setup("checkout", 10).held();
    let mut pipeline = Pipeline::with(&[setup.clone()]);
    let id = pipeline.start("b-1").await;

    let first = pipeline.engine.abort(&id).await.unwrap();
    let published = pipeline.store.published_for(&id).len();
    let second = pipeline.engine.abort(&id).await.unwrap();

    assert_eq!(first.build.status, Status::Canceled);
    assert_eq!(second.build.status, Status::Canceled);
    assert_eq!(first.build.end_date, second.build.end_date);
    assert_eq!(pipeline.store.published_for(&id).len(), published);

    setup.release();
    assert_eq!(pipeline.finished().await.status, Status::Canceled);
    assert!(pipeline.engine.abort(&id).await.is_none());
}

#[tokio::test]
async fn abort_during_setup_never_runs_phases() {
    let setup = FakeProvider::setup("checkout", 10)
        .with_stages(vec![stage(&["lint"])])
        .held();
    let run = FakeProvider::run_phase("shell", 20);
    let tear_down = FakeProvider::tear_down("cleanup", 30);
    let mut pipeline = Pipeline::with(&[setup.clone(), run.clone(), tear_down.clone()]);
    let id = pipeline.start("b-1").await;

    pipeline.engine.abort(&id).await.unwrap();
    setup.release();
    let build = pipeline.finished().await;

    assert_eq!(build.status, Status::Canceled);
    assert_eq!(run.call_count(), 0);
    assert_eq!(tear_down.call_count(), 1);
    assert!(pipeline.containers.calls().is_empty());
}

#[tokio::test]
async fn delete_removes_every_container_the_build_used() {
    let setup = FakeProvider::setup("checkout", 10).with_stages(vec![stage(&["lint", "test"])]);
    let run = FakeProvider::run_phase("shell", 20)
        .with_container(0, "c-0")
        .with_container(1, "c-1");
    let mut pipeline = Pipeline::with(&[setup, run]);

    pipeline.start("b-1").await;
    let build = pipeline.finished().await;
    pipeline.engine.delete(&build).await;

    assert_eq!(
        pipeline.containers.calls(),
        vec![ContainerCall::Delete {
            ids: vec!["c-0".into(), "c-1".into()]
        }]
    );
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end build scenarios over a real bus

use crate::prelude::*;
use similar_asserts::assert_eq;

#[tokio::test]
async fn every_step_succeeds_and_the_build_is_done() {
    let setup = FakeProvider::setup("checkout", 10).with_stages(vec![stage(&["lint", "test"])]);
    let run = FakeProvider::run_phase("shell", 20);
    let tear_down = FakeProvider::tear_down("cleanup", 30);
    let mut pipeline = Pipeline::with(&[setup.clone(), run.clone(), tear_down.clone()]);

    let id = pipeline.start("b-1").await;
    let build = pipeline.finished().await;

    assert_eq!(build.id, id);
    assert_eq!(build.status, Status::Done);
    assert_eq!(
        statuses(&build),
        vec![("lint".into(), Status::Done), ("test".into(), Status::Done)]
    );
    assert!(build.end_date.is_some());
    assert_eq!(setup.call_count(), 1);
    assert_eq!(run.call_count(), 2);
    assert_eq!(tear_down.call_count(), 1);
    assert!(pipeline.engine.active_flows().is_empty());
    assert_eq!(pipeline.store.latest(&id).unwrap().status, Status::Done);
}

#[tokio::test]
async fn failed_phase_cancels_the_next_stage_and_still_tears_down() {
    let setup = FakeProvider::setup("checkout", 10)
        .with_stages(vec![stage(&["lint", "test"]), stage(&["deploy"])]);
    let run = FakeProvider::run_phase("shell", 20).fail_phase(1, 500, "tests failed");
    let tear_down = FakeProvider::tear_down("cleanup", 30);
    let mut pipeline = Pipeline::with(&[setup, run.clone(), tear_down.clone()]);

    pipeline.start("b-1").await;
    let build = pipeline.finished().await;

    assert_eq!(build.status, Status::Failed);
    assert_eq!(
        statuses(&build),
        vec![
            ("lint".into(), Status::Done),
            ("test".into(), Status::Failed),
            ("deploy".into(), Status::Canceled),
        ]
    );
    assert_eq!(build.status_message.as_deref(), Some("tests failed"));
    assert_eq!(run.call_count(), 2);
    assert_eq!(tear_down.call_count(), 1);
}

#[tokio::test]
async fn abort_mid_run_kills_containers_and_skips_to_teardown() {
    let setup = FakeProvider::setup("checkout", 10)
        .with_stages(vec![stage(&["lint", "test"]), stage(&["deploy"])]);
    let run = FakeProvider::run_phase("shell", 20)
        .emit_update(0, "c-0")
        .emit_update(1, "c-1")
        .held();
    let tear_down = FakeProvider::tear_down("cleanup", 30);
    let mut pipeline = Pipeline::with(&[setup, run.clone(), tear_down.clone()]);

    let id = pipeline.start("b-1").await;
    pipeline
        .wait_until(&id, |b| {
            b.phases.len() == 3 && b.phases.iter().take(2).all(|p| p.container_id.is_some())
        })
        .await;

    let outcome = pipeline.engine.abort(&id).await.unwrap();
    assert_eq!(outcome.container_ids, vec!["c-0".to_string(), "c-1".to_string()]);
    assert_eq!(outcome.build.status, Status::Canceled);
    assert_eq!(
        pipeline.containers.calls(),
        vec![ContainerCall::Kill {
            ids: vec!["c-0".into(), "c-1".into()]
        }]
    );

    run.release();
    let build = pipeline.finished().await;

    assert_eq!(build.status, Status::Canceled);
    assert!(build.phases.iter().all(|p| p.status == Status::Canceled));
    assert_eq!(tear_down.call_count(), 1);
    // The queued stage never reached a provider
    assert_eq!(run.call_count(), 2);
}

#[tokio::test]
async fn phase_update_moves_the_container_without_advancing_the_chain() {
    let setup = FakeProvider::setup("checkout", 10).with_stages(vec![stage(&["lint", "test"])]);
    let first = FakeProvider::run_phase("prepare", 20).emit_update(0, "c-new").held();
    let second = FakeProvider::run_phase("shell", 30);
    let mut pipeline = Pipeline::with(&[setup, first.clone(), second.clone()]);

    let id = pipeline.start("b-1").await;
    let build = pipeline
        .wait_until(&id, |b| {
            b.phases.first().and_then(|p| p.container_id.as_deref()) == Some("c-new")
        })
        .await;

    assert_eq!(build.phases[0].status, Status::InFlight);
    let published = pipeline.store.latest(&id).unwrap();
    assert_eq!(published.phases[0].container_id.as_deref(), Some("c-new"));
    assert_eq!(second.call_count(), 0);

    first.release();
    let build = pipeline.finished().await;

    assert_eq!(build.status, Status::Done);
    assert_eq!(first.call_count(), 2);
    assert_eq!(second.call_count(), 2);
    assert_eq!(build.phases[0].container_id.as_deref(), Some("c-new"));
}

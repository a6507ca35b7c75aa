// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider chains run in order, one step at a time

use crate::prelude::*;
use similar_asserts::assert_eq;

#[tokio::test]
async fn setup_providers_run_one_after_another_by_order() {
    let late = FakeProvider::setup("late", 30);
    let early = FakeProvider::setup("early", 10);
    let middle = FakeProvider::setup("middle", 20).held();
    let mut pipeline = Pipeline::with(&[late.clone(), early.clone(), middle.clone()]);

    pipeline.start("b-1").await;
    eventually("middle setup provider", || middle.call_count() == 1).await;

    // A held step blocks the rest of the chain
    assert_eq!(early.call_count(), 1);
    assert_eq!(late.call_count(), 0);

    middle.release();
    let build = pipeline.finished().await;

    assert_eq!(build.status, Status::Done);
    let (e, m, l) = (tokens(&early)[0], tokens(&middle)[0], tokens(&late)[0]);
    assert!(e < m && m < l, "tokens out of order: {e} {m} {l}");
}

#[tokio::test]
async fn equal_orders_keep_registration_order() {
    let first = FakeProvider::setup("first", 50);
    let second = FakeProvider::setup("second", 50);
    let mut pipeline = Pipeline::with(&[first.clone(), second.clone()]);

    pipeline.start("b-1").await;
    pipeline.finished().await;

    assert!(tokens(&first)[0] < tokens(&second)[0]);
}

#[tokio::test]
async fn a_stage_fans_out_one_command_per_phase() {
    let setup = FakeProvider::setup("checkout", 10)
        .with_stages(vec![stage(&["a", "b", "c"])]);
    let first = FakeProvider::run_phase("prepare", 20).held();
    let second = FakeProvider::run_phase("shell", 30);
    let mut pipeline = Pipeline::with(&[setup, first.clone(), second.clone()]);

    pipeline.start("b-1").await;
    eventually("fan-out to the first phase provider", || first.call_count() == 3).await;
    assert_eq!(second.call_count(), 0);

    first.release();
    let build = pipeline.finished().await;

    assert_eq!(build.status, Status::Done);
    assert_eq!(second.call_count(), 3);
}

#[tokio::test]
async fn each_phase_walks_the_provider_chain_in_order() {
    let setup = FakeProvider::setup("checkout", 10).with_stages(vec![stage(&["a", "b"])]);
    let first = FakeProvider::run_phase("prepare", 20);
    let second = FakeProvider::run_phase("shell", 30);
    let mut pipeline = Pipeline::with(&[setup, first.clone(), second.clone()]);

    pipeline.start("b-1").await;
    pipeline.finished().await;

    for index in 0..2 {
        let token_at = |provider: &FakeProvider| {
            provider
                .calls()
                .iter()
                .find(|c| c.phase.as_ref().map(|p| p.index) == Some(index))
                .map(|c| c.token.0)
                .unwrap()
        };
        assert!(token_at(&first) < token_at(&second), "phase {index} skipped ahead");
    }
}

#[tokio::test]
async fn stages_run_one_after_another() {
    let setup = FakeProvider::setup("checkout", 10)
        .with_stages(vec![stage(&["build"]), stage(&["test", "package"])]);
    let run = FakeProvider::run_phase("shell", 20);
    let mut pipeline = Pipeline::with(&[setup, run.clone()]);

    pipeline.start("b-1").await;
    let build = pipeline.finished().await;

    let ran: Vec<String> = run
        .calls()
        .iter()
        .filter_map(|c| c.phase.as_ref().map(|p| p.id.clone()))
        .collect();
    assert_eq!(ran[0], "build");
    assert_eq!(ran.len(), 3);
    assert_eq!(build.status, Status::Done);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;
use kiln_core::{PhasePatch, Repository, RepositoryKind};
use similar_asserts::assert_eq;

fn now() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

fn chains(setup: &[i32], run: &[i32], tear_down: &[i32]) -> Arc<ProviderChains> {
    Arc::new(ProviderChains::from_orders(setup, run, tear_down))
}

fn phases(ids: &[&str]) -> Vec<Phase> {
    ids.iter().map(|id| Phase::new(*id, *id).unwrap()).collect()
}

fn flow(chains: Arc<ProviderChains>) -> Flow {
    let build = Build::new("b-1", now()).unwrap();
    Flow::new(build, Some("make all".into()), chains)
}

fn commands(effects: &[FlowEffect]) -> Vec<(Address, Command)> {
    effects
        .iter()
        .filter_map(|e| match e {
            FlowEffect::Dispatch { address, command } => Some((*address, command.clone())),
            _ => None,
        })
        .collect()
}

fn snapshots(effects: &[FlowEffect]) -> Vec<Build> {
    effects
        .iter()
        .filter_map(|e| match e {
            FlowEffect::PublishSnapshot(b) => Some(b.clone()),
            _ => None,
        })
        .collect()
}

fn ended(effects: &[FlowEffect]) -> Option<Build> {
    effects.iter().find_map(|e| match e {
        FlowEffect::End(b) => Some(b.clone()),
        _ => None,
    })
}

fn only(effects: &[FlowEffect]) -> Command {
    let mut cmds = commands(effects);
    assert_eq!(cmds.len(), 1, "expected exactly one command: {:?}", cmds);
    cmds.remove(0).1
}

fn ok(cmd: &Command) -> Event {
    Event::completion(cmd)
}

fn fail(cmd: &Command, code: u16) -> Event {
    Event::failed(cmd, code, format!("{} failed", cmd.kind))
}

/// Start a flow and answer setup with the given stages
fn into_run(flow: &mut Flow, stages: Vec<Vec<Phase>>) -> Vec<FlowEffect> {
    let setup = only(&flow.start(now()));
    flow.process(ok(&setup).with_stages(stages), now())
}

#[test]
fn start_marks_build_in_flight_and_commands_first_setup_provider() {
    let mut flow = flow(chains(&[20, 10], &[], &[]));
    let effects = flow.start(now());

    let cmds = commands(&effects);
    assert_eq!(cmds.len(), 1);
    assert_eq!(cmds[0].0.order, 10);
    assert_eq!(cmds[0].1.kind, Capability::Setup);
    assert_eq!(cmds[0].1.script.as_deref(), Some("make all"));
    assert_eq!(flow.build().status, Status::InFlight);
    assert_eq!(flow.state(), Some(FlowState::Setup));
}

#[test]
fn setup_chain_is_sequential() {
    let mut flow = flow(chains(&[10, 20, 30], &[], &[40]));
    let mut cmd = only(&flow.start(now()));
    let mut tokens = Vec::new();

    for _ in 0..3 {
        assert_eq!(cmd.kind, Capability::Setup);
        tokens.push(cmd.token);
        let effects = flow.process(ok(&cmd), now());
        cmd = only(&effects);
    }

    tokens.dedup();
    assert_eq!(tokens.len(), 3);
    assert_eq!(cmd.kind, Capability::TearDown, "no stages, so RUN exits at once");
    assert_eq!(flow.state(), Some(FlowState::TearDown));
}

#[test]
fn setup_failure_skips_straight_to_teardown() {
    let mut flow = flow(chains(&[10, 20], &[30], &[40]));
    let setup = only(&flow.start(now()));

    let effects = flow.process(fail(&setup, 500), now());
    let next = only(&effects);

    assert_eq!(next.kind, Capability::TearDown);
    assert_eq!(flow.build().status, Status::Failed);
    assert_eq!(flow.build().status_message.as_deref(), Some("setup failed"));
    assert_eq!(snapshots(&effects).len(), 1);

    let effects = flow.process(ok(&next), now());
    let end = ended(&effects).unwrap();
    assert_eq!(end.status, Status::Failed);
    assert!(flow.is_ended());
}

#[test]
fn setup_updates_workspace_and_repository() {
    let mut flow = flow(chains(&[10], &[], &[]));
    let setup = only(&flow.start(now()));
    let repo = Repository::new(RepositoryKind::Git, "git@host:app.git");

    let effects = flow.process(
        ok(&setup)
            .with_workspace(kiln_core::Workspace::new("/ws/b-1"))
            .with_repository(repo.clone()),
        now(),
    );

    let end = ended(&effects).unwrap();
    assert_eq!(end.repository, repo);
    assert_eq!(end.workspace.path.to_str(), Some("/ws/b-1"));
}

#[test]
fn stage_fans_out_one_command_per_phase() {
    let mut flow = flow(chains(&[10], &[20, 25], &[30]));
    let effects = into_run(&mut flow, vec![phases(&["a", "b", "c"])]);

    let cmds = commands(&effects);
    assert_eq!(cmds.len(), 3, "K commands, not K x M");
    assert!(cmds.iter().all(|(a, c)| a.order == 20 && c.kind == Capability::RunPhase));
    let indexes: Vec<usize> = cmds
        .iter()
        .map(|(_, c)| c.phase.as_ref().unwrap().index)
        .collect();
    assert_eq!(indexes, vec![0, 1, 2]);
    assert!(flow.build().phases.iter().all(|p| p.status == Status::InFlight));
    assert!(!snapshots(&effects).is_empty());
}

#[test]
fn each_phase_walks_its_own_chain() {
    let mut flow = flow(chains(&[10], &[20, 25], &[30]));
    let cmds = commands(&into_run(&mut flow, vec![phases(&["a", "b"])]));

    let effects = flow.process(ok(&cmds[1].1), now());
    let (address, next) = commands(&effects).remove(0);
    assert_eq!(address.order, 25);
    assert_eq!(next.phase.as_ref().unwrap().index, 1);
    assert_eq!(flow.phase_progress(0), Some(1));
    assert_eq!(flow.phase_progress(1), Some(2));
    assert_eq!(flow.build().phases[1].run_results, vec![Status::Done, Status::InFlight]);
}

#[test]
fn scenario_all_steps_succeed() {
    let mut flow = flow(chains(&[10], &[20], &[30]));
    let cmds = commands(&into_run(&mut flow, vec![phases(&["a", "b"])]));
    assert_eq!(cmds.len(), 2);

    assert!(commands(&flow.process(ok(&cmds[0].1), now())).is_empty());
    let teardown = only(&flow.process(ok(&cmds[1].1), now()));
    assert_eq!(teardown.kind, Capability::TearDown);

    let effects = flow.process(ok(&teardown), now());
    let end = ended(&effects).unwrap();
    assert_eq!(end.status, Status::Done);
    assert!(end.phases.iter().all(|p| p.status == Status::Done));
    assert_eq!(end.end_date, Some(now()));
}

#[test]
fn failed_phase_cancels_queued_stages() {
    let mut flow = flow(chains(&[10], &[20], &[30]));
    let cmds = commands(&into_run(
        &mut flow,
        vec![phases(&["a", "b"]), phases(&["c", "d"])],
    ));

    flow.process(ok(&cmds[0].1), now());
    let effects = flow.process(fail(&cmds[1].1, 500), now());
    let teardown = only(&effects);

    assert_eq!(teardown.kind, Capability::TearDown);
    let statuses: Vec<Status> = flow.build().phases.iter().map(|p| p.status).collect();
    assert_eq!(
        statuses,
        vec![Status::Done, Status::Failed, Status::Canceled, Status::Canceled]
    );
    assert_eq!(flow.queued_stages(), 0);

    let end = ended(&flow.process(ok(&teardown), now())).unwrap();
    assert_eq!(end.status, Status::Failed);
    assert_eq!(end.status_message.as_deref(), Some("run_phase failed"));
}

#[test]
fn failed_phase_stops_its_chain_but_siblings_finish() {
    let mut flow = flow(chains(&[10], &[20, 25], &[30]));
    let cmds = commands(&into_run(&mut flow, vec![phases(&["a", "b"])]));

    assert!(commands(&flow.process(fail(&cmds[0].1, 500), now())).is_empty());
    assert_eq!(flow.state(), Some(FlowState::Run), "sibling still running");

    let second = only(&flow.process(ok(&cmds[1].1), now()));
    assert_eq!(second.phase.as_ref().unwrap().index, 1);
    let teardown = only(&flow.process(ok(&second), now()));
    assert_eq!(teardown.kind, Capability::TearDown);
}

#[test]
fn successful_stage_starts_the_next() {
    let mut flow = flow(chains(&[10], &[20], &[30]));
    let cmds = commands(&into_run(&mut flow, vec![phases(&["a"]), phases(&["b", "c"])]));

    let effects = flow.process(ok(&cmds[0].1), now());
    let next = commands(&effects);
    assert_eq!(next.len(), 2);
    assert_eq!(next[0].1.phase.as_ref().unwrap().id, "b");
    assert_eq!(next[1].1.phase.as_ref().unwrap().index, 1);
    assert_eq!(flow.queued_stages(), 1);
}

#[test]
fn abort_mid_run_unwinds_on_next_event() {
    let mut flow = flow(chains(&[10], &[20], &[30]));
    let cmds = commands(&into_run(
        &mut flow,
        vec![phases(&["a", "b"]), phases(&["c"])],
    ));
    flow.process(
        Event::phase_update(
            flow.build().id.clone(),
            cmds[0].1.token,
            PhasePatch::new(0).container("c-a"),
        ),
        now(),
    );

    let ids = flow.abort(now());
    assert_eq!(ids, vec!["c-a".to_string()]);
    assert_eq!(flow.build().status, Status::Canceled);
    assert!(flow
        .build()
        .phases
        .iter()
        .all(|p| p.status == Status::Canceled));
    assert_eq!(flow.queued_stages(), 2, "abort itself changes no state");

    let teardown = only(&flow.process(ok(&cmds[1].1), now()));
    assert_eq!(teardown.kind, Capability::TearDown);
    assert_eq!(flow.state(), Some(FlowState::TearDown));

    let end = ended(&flow.process(ok(&teardown), now())).unwrap();
    assert_eq!(end.status, Status::Canceled);
}

#[test]
fn abort_is_idempotent() {
    let mut flow = flow(chains(&[10], &[20], &[30]));
    let cmds = commands(&into_run(&mut flow, vec![phases(&["a"])]));
    flow.process(ok(&cmds[0].1), now());
    let before = flow.build().clone();

    let _ = flow.abort(now());
    let after_first = flow.build().clone();
    let second = flow.abort(now());

    assert!(second.is_empty());
    assert_eq!(flow.build(), &after_first);
    assert_ne!(&before, &after_first);
}

#[test]
fn abort_during_setup_skips_run() {
    let mut flow = flow(chains(&[10, 20], &[30], &[40]));
    let setup = only(&flow.start(now()));
    flow.abort(now());

    let effects = flow.process(ok(&setup).with_stages(vec![phases(&["a"])]), now());
    let teardown = only(&effects);
    assert_eq!(teardown.kind, Capability::TearDown);
    assert!(flow.build().phases.is_empty(), "aborted setup results are ignored");
}

#[test]
fn aborted_flow_ignores_teardown_failure() {
    let mut flow = flow(chains(&[10], &[], &[30, 40]));
    let setup = only(&flow.start(now()));
    flow.abort(now());
    let first = only(&flow.process(ok(&setup), now()));

    let second = only(&flow.process(fail(&first, 500), now()));
    assert_eq!(second.kind, Capability::TearDown);
    let end = ended(&flow.process(ok(&second), now())).unwrap();
    assert_eq!(end.status, Status::Canceled);
}

#[test]
fn teardown_failure_ends_flow_immediately() {
    let mut flow = flow(chains(&[], &[], &[30, 40]));
    let first = only(&flow.start(now()));

    let effects = flow.process(fail(&first, 503), now());
    assert!(commands(&effects).is_empty());
    let end = ended(&effects).unwrap();
    assert_eq!(end.status, Status::Failed);
}

#[test]
fn phase_update_changes_container_only() {
    let mut flow = flow(chains(&[10], &[20, 25], &[30]));
    let cmds = commands(&into_run(&mut flow, vec![phases(&["a", "b"])]));
    let progress = flow.phase_progress(0);
    let outstanding = flow.outstanding();

    let update = Event::phase_update(
        flow.build().id.clone(),
        cmds[0].1.token,
        PhasePatch::new(0).container("c-new").host("node-3", 2376),
    );
    let effects = flow.process(update, now());

    assert!(commands(&effects).is_empty());
    assert_eq!(snapshots(&effects).len(), 1);
    let phase = &flow.build().phases[0];
    assert_eq!(phase.container_id.as_deref(), Some("c-new"));
    assert_eq!(phase.container_port, Some(2376));
    assert_eq!(flow.phase_progress(0), progress);
    assert_eq!(flow.outstanding(), outstanding);
}

#[test]
fn phase_update_without_container_or_failed_is_ignored() {
    let mut flow = flow(chains(&[10], &[20], &[30]));
    let cmds = commands(&into_run(&mut flow, vec![phases(&["a"])]));
    let token = cmds[0].1.token;

    let bare = Event::phase_update(flow.build().id.clone(), token, PhasePatch::new(0));
    assert!(flow.process(bare, now()).is_empty());

    let failed = Event::phase_update(flow.build().id.clone(), token, PhasePatch::new(0).container("x"))
        .with_status(500, "boom");
    assert!(flow.process(failed, now()).is_empty());
    assert_eq!(flow.build().phases[0].container_id, None);
}

#[test]
fn phase_update_with_foreign_token_is_dropped() {
    let mut flow = flow(chains(&[10], &[20], &[30]));
    let cmds = commands(&into_run(&mut flow, vec![phases(&["a", "b"])]));

    // token of phase 1 claiming phase 0
    let update = Event::phase_update(
        flow.build().id.clone(),
        cmds[1].1.token,
        PhasePatch::new(0).container("c-x"),
    );
    assert!(flow.process(update, now()).is_empty());
    assert_eq!(flow.build().phases[0].container_id, None);
}

#[test]
fn completion_carries_container_fields() {
    let mut flow = flow(chains(&[10], &[20, 25], &[30]));
    let cmds = commands(&into_run(&mut flow, vec![phases(&["a"])]));

    let reply = ok(&cmds[0].1).with_phase(PhasePatch::new(0).container("c-1").host("h", 1));
    let next = only(&flow.process(reply, now()));
    let sent = next.phase.unwrap();
    assert_eq!(sent.container_id.as_deref(), Some("c-1"));
    assert_eq!(sent.container_host.as_deref(), Some("h"));
}

#[test]
fn child_repository_is_applied_even_on_failure() {
    let mut flow = flow(chains(&[10], &[20], &[30]));
    let cmds = commands(&into_run(&mut flow, vec![phases(&["a"])]));
    let child = Repository::new(RepositoryKind::Git, "git@host:lib.git").with_metadata("rev 9");

    flow.process(fail(&cmds[0].1, 500).with_child_repository(child.clone()), now());
    assert_eq!(flow.build().repository.children, vec![child]);
}

#[test]
fn stale_and_duplicate_replies_are_dropped() {
    let mut flow = flow(chains(&[10, 20], &[], &[30]));
    let setup = only(&flow.start(now()));

    let mut forged = ok(&setup);
    forged.token = CommandToken(999);
    assert!(flow.process(forged, now()).is_empty());

    let second = only(&flow.process(ok(&setup), now()));
    assert!(flow.process(ok(&setup), now()).is_empty(), "duplicate reply");
    assert_eq!(flow.outstanding(), vec![second.token]);
}

#[test]
fn reply_of_the_wrong_kind_is_dropped() {
    let mut flow = flow(chains(&[10], &[], &[30]));
    let setup = only(&flow.start(now()));
    let mut wrong = ok(&setup);
    wrong.kind = EventKind::TearDownEnd;
    assert!(flow.process(wrong, now()).is_empty());
    assert_eq!(flow.state(), Some(FlowState::Setup));
}

#[test]
fn unknown_phase_index_is_dropped() {
    let mut flow = flow(chains(&[10], &[20], &[30]));
    let cmds = commands(&into_run(&mut flow, vec![phases(&["a"])]));
    let mut reply = ok(&cmds[0].1);
    reply.phase = Some(PhasePatch::new(7));
    assert!(flow.process(reply, now()).is_empty());
    assert_eq!(flow.phase_progress(0), Some(1));
}

#[test]
fn zero_phase_providers_resolve_phases_done() {
    let mut flow = flow(chains(&[10], &[], &[30]));
    let effects = into_run(&mut flow, vec![phases(&["a", "b"]), phases(&["c"])]);

    let teardown = only(&effects);
    assert_eq!(teardown.kind, Capability::TearDown);
    assert!(flow.build().phases.iter().all(|p| p.status == Status::Done));

    let end = ended(&flow.process(ok(&teardown), now())).unwrap();
    assert_eq!(end.status, Status::Done);
}

#[test]
fn empty_stage_completes_as_successful() {
    let mut flow = flow(chains(&[10], &[20], &[30]));
    let effects = into_run(&mut flow, vec![vec![], phases(&["a"])]);

    let cmd = only(&effects);
    assert_eq!(cmd.kind, Capability::RunPhase);
    assert_eq!(cmd.phase.unwrap().id, "a");
}

#[test]
fn no_providers_at_all_ends_done() {
    let mut flow = flow(chains(&[], &[], &[]));
    let effects = flow.start(now());
    let end = ended(&effects).unwrap();
    assert_eq!(end.status, Status::Done);
    assert!(flow.is_ended());
}

#[test]
fn events_after_end_are_dropped() {
    let mut flow = flow(chains(&[], &[], &[30]));
    let teardown = only(&flow.start(now()));
    assert!(ended(&flow.process(ok(&teardown), now())).is_some());
    assert!(flow.process(ok(&teardown), now()).is_empty());
}

#[test]
fn setup_stages_replace_build_phases() {
    let mut flow = flow(chains(&[10], &[20], &[30]));
    let mut preset = phases(&["old"]);
    preset[0].status = Status::Done;
    preset[0].run_results = vec![Status::Done];
    let _ = into_run(&mut flow, vec![preset, phases(&["new"])]);

    let ids: Vec<&str> = flow.build().phases.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["old", "new"]);
    assert_eq!(flow.build().phases[0].status, Status::InFlight);
    assert_eq!(flow.build().phases[1].status, Status::Parked);
}

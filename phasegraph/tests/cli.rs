//! CLI tests for the `phasegraph` binary.
//!
//! Spawns the binary against a temp workspace and verifies exit codes for
//! ready, complete, halted and limit states.

use std::path::Path;
use std::process::{Command, Output};

use phasegraph::exit_codes;
use phasegraph::task::TaskStatus;
use phasegraph::test_support::{TestWorkspace, phase, task};

fn phasegraph(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_phasegraph"))
        .current_dir(root)
        .args(args)
        .output()
        .expect("run phasegraph")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("json stdout")
}

#[test]
fn init_then_plan_create_and_next() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();

    let init = phasegraph(root, &["init"]);
    assert_eq!(init.status.code(), Some(exit_codes::OK));
    let again = phasegraph(root, &["init"]);
    assert_eq!(again.status.code(), Some(exit_codes::INVALID));

    let create = phasegraph(root, &["plan", "create", "alpha", "--activate"]);
    assert_eq!(create.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout_json(&create)["active_phase"], "discovery");

    let added = phasegraph(
        root,
        &["add-task", "--id", "scan", "--description", "Scan the repo"],
    );
    assert_eq!(added.status.code(), Some(exit_codes::OK));

    let next = phasegraph(root, &["next"]);
    assert_eq!(next.status.code(), Some(exit_codes::OK));
    let outcome = stdout_json(&next);
    assert_eq!(outcome["outcome"], "ready");
    assert_eq!(outcome["schedule"]["groups"][0][0], "scan");
}

#[test]
fn next_exits_complete_when_iteration_done() {
    let tw = TestWorkspace::new();
    let plan = tw.ws.create_plan("p", "kickoff").expect("plan");
    plan.add_task(task("only", &[])).expect("add");
    plan.set_status("only", TaskStatus::InProgress).expect("claim");
    plan.set_status("only", TaskStatus::Done).expect("done");

    let output = phasegraph(tw.root(), &["next", "--plan", "p"]);
    assert_eq!(output.status.code(), Some(exit_codes::COMPLETE));
    assert_eq!(stdout_json(&output)["outcome"], "iteration-complete");
}

#[test]
fn next_exits_halted_when_task_blocked() {
    let tw = TestWorkspace::new();
    let plan = tw.ws.create_plan("p", "kickoff").expect("plan");
    tw.ws.switch_active("p", None).expect("activate");
    plan.add_tasks(vec![task("x", &[]), task("y", &[])])
        .expect("add");

    let claim = phasegraph(tw.root(), &["set-status", "x", "in-progress"]);
    assert_eq!(claim.status.code(), Some(exit_codes::OK));
    let block = phasegraph(tw.root(), &["set-status", "x", "blocked"]);
    assert_eq!(block.status.code(), Some(exit_codes::OK));

    let next = phasegraph(tw.root(), &["next"]);
    assert_eq!(next.status.code(), Some(exit_codes::HALTED));
    let blocked = phasegraph(tw.root(), &["blocked"]);
    assert_eq!(blocked.status.code(), Some(exit_codes::HALTED));

    let illegal = phasegraph(tw.root(), &["set-status", "x", "done"]);
    assert_eq!(illegal.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn loop_past_budget_exits_limit() {
    let tw = TestWorkspace::with_phases(vec![
        phase("build", &["build", "ship"], 1, &[]),
        phase("ship", &[], 0, &[]),
    ]);
    tw.ws.create_plan("p", "kickoff").expect("plan");
    tw.ws.switch_active("p", None).expect("activate");

    let first = phasegraph(tw.root(), &["loop", "--reason", "retry"]);
    assert_eq!(first.status.code(), Some(exit_codes::OK));
    let second = phasegraph(tw.root(), &["loop", "--reason", "retry"]);
    assert_eq!(second.status.code(), Some(exit_codes::LIMIT));

    let done = phasegraph(tw.root(), &["advance", "ship"]);
    assert_eq!(done.status.code(), Some(exit_codes::OK));
    let next = phasegraph(tw.root(), &["next"]);
    assert_eq!(next.status.code(), Some(exit_codes::COMPLETE));
    assert_eq!(stdout_json(&next)["outcome"], "plan-finished");
}

#[test]
fn commands_without_active_plan_fail() {
    let tw = TestWorkspace::new();
    let output = phasegraph(tw.root(), &["available"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no active plan"));
}

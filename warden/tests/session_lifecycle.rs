//! Loop-level harness tests for full session lifecycle scenarios.
//!
//! These tests drive `run_session`/`run_iteration` through multiple
//! iterations to verify end-to-end behavior: criteria progress, decision
//! application, circuit breaking, budget exhaustion, operator control, and
//! resumption.

use std::fs;

use warden::core::decision::Action;
use warden::core::types::SessionStatus;
use warden::io::config::WardenConfig;
use warden::io::control::{OwnerLock, SentinelControl, request_pause};
use warden::io::state_store::load_session;
use warden::session::{resume_session, run_iteration, run_session};
use warden::status::collect_status;
use warden::test_support::{
    ScriptedInvoke, ScriptedInvoker, ScriptedTestRunner, ScriptedVcs, TestWorkspace, criterion,
};

fn sentinel(ws: &TestWorkspace) -> SentinelControl {
    SentinelControl::new(ws.paths())
}

/// Full lifecycle: three criteria checked over three iterations, then the
/// session completes on structural evidence alone (no exit marker needed).
#[test]
fn session_completes_when_all_criteria_check_off() {
    let ws = TestWorkspace::start_with_criteria(vec![
        criterion(1, "parser handles empty input"),
        criterion(2, "round-trip preserved"),
        criterion(3, "docs updated"),
    ])
    .expect("workspace");

    let invoker = ScriptedInvoker::new(vec![
        ScriptedInvoke::respond_and_touch(
            "Edited the parser to handle empty input.\nCRITERION_DONE: 1",
            "parser.rs",
        ),
        ScriptedInvoke::respond_and_touch(
            "Wrote the round-trip property.\nCRITERION_DONE: 2",
            "roundtrip.rs",
        ),
        ScriptedInvoke::respond_and_touch(
            "Wrote the docs section.\nCRITERION_DONE: 3",
            "docs.md",
        ),
    ]);
    let tests = ScriptedTestRunner::passing(3);
    let vcs = ScriptedVcs::always(true);

    let mut seen = Vec::new();
    let outcome = run_session(ws.root(), &invoker, &tests, &vcs, &sentinel(&ws), |report| {
        seen.push((report.iter, report.decision.action));
    })
    .expect("run session");

    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.iterations_executed, 3);
    assert_eq!(
        seen,
        vec![
            (1, Action::Continue),
            (2, Action::Continue),
            (3, Action::Complete)
        ]
    );

    let record = load_session(&ws.paths().session_path).expect("load session");
    assert_eq!(record.status, SessionStatus::Completed);
    assert_eq!(record.next_iter, 4);
    assert!(record.criteria.all_complete());
    assert_eq!(record.budget.len(), 3);
    assert_eq!(record.budget.cumulative_tokens(), 3 * 150);

    // Audit trail exists for every iteration.
    for iter in 1..=3u32 {
        let dir = ws.paths().iteration_dir(&outcome.run_id, iter);
        assert!(dir.join("signals.json").is_file());
        assert!(dir.join("outcome.json").is_file());
        assert!(dir.join("decision.json").is_file());
        assert!(dir.join("agent.log").is_file());
        assert!(dir.join("tests.log").is_file());
    }

    invoker.assert_drained().expect("invoker drained");
    tests.assert_drained().expect("tests drained");
}

/// A completion declaration with no tool activity and an incomplete
/// checklist pauses for a human; after resume, real work completes the
/// session.
#[test]
fn hallucinated_completion_pauses_then_resumes_to_completion() {
    let ws = TestWorkspace::start_with_criteria(vec![criterion(1, "feature lands")])
        .expect("workspace");

    let invoker = ScriptedInvoker::new(vec![ScriptedInvoke::respond("TASK_COMPLETE")]);
    let tests = ScriptedTestRunner::passing(1);
    let vcs = ScriptedVcs::always(false);

    let outcome = run_session(ws.root(), &invoker, &tests, &vcs, &sentinel(&ws), |_| {}).expect("run session");
    assert_eq!(outcome.status, SessionStatus::Paused);
    let decision = outcome.last_decision.expect("decision");
    assert_eq!(decision.action, Action::Pause);
    assert!(decision.requires_human);

    // Stepping a paused session is refused until resume.
    {
        let paths = ws.paths();
        let owner = OwnerLock::acquire(&paths).expect("owner");
        let err = run_iteration(
            ws.root(),
            &ScriptedInvoker::new(Vec::new()),
            &ScriptedTestRunner::new(Vec::new()),
            &vcs,
            &owner,
        )
        .expect_err("paused session should not step");
        assert!(err.to_string().contains("paused"));
    }

    assert_eq!(resume_session(ws.root()).expect("resume"), SessionStatus::Running);

    let invoker2 = ScriptedInvoker::new(vec![ScriptedInvoke::respond_and_touch(
        "Implemented the feature.\nCRITERION_DONE: 1\nTASK_COMPLETE",
        "feature.rs",
    )]);
    let tests2 = ScriptedTestRunner::passing(1);
    let vcs2 = ScriptedVcs::always(true);
    let outcome2 = run_session(ws.root(), &invoker2, &tests2, &vcs2, &sentinel(&ws), |_| {})
        .expect("run session");
    assert_eq!(outcome2.status, SessionStatus::Completed);
    assert_eq!(outcome2.started_at_iter, 2);
}

/// Repeated invocation failures trip the breaker at the error threshold and
/// the session aborts with a reason naming the streak.
#[test]
fn consecutive_invocation_failures_trip_the_breaker() {
    let ws = TestWorkspace::start_with_criteria(vec![criterion(1, "never reached")])
        .expect("workspace");

    let invoker = ScriptedInvoker::new(vec![
        ScriptedInvoke::fail("agent timed out"),
        ScriptedInvoke::fail("agent timed out"),
        ScriptedInvoke::fail("agent timed out"),
    ]);
    // Failed invocations short-circuit before tests run.
    let tests = ScriptedTestRunner::new(Vec::new());
    let vcs = ScriptedVcs::always(false);

    let outcome = run_session(ws.root(), &invoker, &tests, &vcs, &sentinel(&ws), |_| {}).expect("run session");
    assert_eq!(outcome.status, SessionStatus::Aborted);
    assert_eq!(outcome.iterations_executed, 3);

    let decision = outcome.last_decision.expect("decision");
    assert_eq!(decision.action, Action::Abort);
    assert!(decision.reason.contains("3 consecutive agent errors"));

    let record = load_session(&ws.paths().session_path).expect("load session");
    assert_eq!(record.health.consecutive_errors, 3);
    assert!(record.health.tripped);
    assert_eq!(record.health.last_error.as_deref(), Some("agent timed out"));
    // Failed iterations still appear in the ledger, with zero tokens.
    assert_eq!(record.budget.len(), 3);
    assert_eq!(record.budget.cumulative_tokens(), 0);

    invoker.assert_drained().expect("invoker drained");
}

/// Exhausting the iteration ceiling aborts with a reason citing it.
#[test]
fn iteration_ceiling_aborts_the_session() {
    let mut cfg = WardenConfig::default();
    cfg.limits.max_iterations = 2;
    let ws = TestWorkspace::start_with(vec![criterion(1, "slow going")], cfg)
        .expect("workspace");

    let invoker = ScriptedInvoker::new(vec![
        ScriptedInvoke::respond_and_touch("Edited module a.", "a.rs"),
        ScriptedInvoke::respond_and_touch("Edited module b.", "b.rs"),
    ]);
    let tests = ScriptedTestRunner::passing(2);
    let vcs = ScriptedVcs::always(true);

    let outcome = run_session(ws.root(), &invoker, &tests, &vcs, &sentinel(&ws), |_| {}).expect("run session");
    assert_eq!(outcome.status, SessionStatus::Aborted);
    assert_eq!(outcome.iterations_executed, 2);
    let decision = outcome.last_decision.expect("decision");
    assert!(decision.reason.contains("iteration budget exhausted"));
}

/// A pending pause sentinel parks the session at the first checkpoint,
/// before any agent call.
#[test]
fn operator_pause_is_honored_at_the_boundary() {
    let ws = TestWorkspace::start_with_criteria(vec![criterion(1, "unstarted")])
        .expect("workspace");

    request_pause(&ws.paths()).expect("request pause");

    let invoker = ScriptedInvoker::new(Vec::new());
    let tests = ScriptedTestRunner::new(Vec::new());
    let vcs = ScriptedVcs::always(false);

    let outcome = run_session(ws.root(), &invoker, &tests, &vcs, &sentinel(&ws), |_| {}).expect("run session");
    assert_eq!(outcome.status, SessionStatus::Paused);
    assert_eq!(outcome.iterations_executed, 0);

    // Sentinel is consumed; status reflects the park.
    let report = collect_status(ws.root()).expect("status");
    assert_eq!(report.status, SessionStatus::Paused);
    assert!(!report.pause_requested);
}

/// A stuck report pauses with the agent's own reason, even when the breaker
/// would also have tripped.
#[test]
fn stuck_report_pauses_with_the_agents_reason() {
    let ws = TestWorkspace::start_with_criteria(vec![criterion(1, "blocked work")])
        .expect("workspace");

    let invoker = ScriptedInvoker::new(vec![ScriptedInvoke::respond(
        "STUCK: production credentials are required for the migration",
    )]);
    let tests = ScriptedTestRunner::passing(1);
    let vcs = ScriptedVcs::always(false);

    let outcome = run_session(ws.root(), &invoker, &tests, &vcs, &sentinel(&ws), |_| {}).expect("run session");
    assert_eq!(outcome.status, SessionStatus::Paused);
    let decision = outcome.last_decision.expect("decision");
    assert!(decision.requires_human);
    assert_eq!(
        decision.reason,
        "production credentials are required for the migration"
    );
}

/// Soft completion phrasing (without checked criteria) ends in `verify`, not
/// `completed`.
#[test]
fn soft_completion_evidence_requests_verification() {
    let ws = TestWorkspace::start_with_criteria(vec![criterion(1, "unverified claim")])
        .expect("workspace");

    let invoker = ScriptedInvoker::new(vec![ScriptedInvoke::respond(
        "Everything is working; all tests pass and the implementation is complete.",
    )]);
    let tests = ScriptedTestRunner::passing(1);
    let vcs = ScriptedVcs::always(false);

    let outcome = run_session(ws.root(), &invoker, &tests, &vcs, &sentinel(&ws), |_| {}).expect("run session");
    assert_eq!(outcome.status, SessionStatus::Verify);
    let decision = outcome.last_decision.expect("decision");
    assert_eq!(decision.action, Action::Verify);
}

/// Crash recovery: a session persisted as running with a dead owner reads
/// as crashed, resumes, and picks up at the next iteration.
#[test]
fn crashed_session_resumes_at_next_iteration() {
    let ws = TestWorkspace::start_with_criteria(vec![
        criterion(1, "first half"),
        criterion(2, "second half"),
    ])
    .expect("workspace");

    // One real iteration.
    let invoker = ScriptedInvoker::new(vec![ScriptedInvoke::respond_and_touch(
        "Did the first half.\nCRITERION_DONE: 1",
        "half.rs",
    )]);
    let tests = ScriptedTestRunner::passing(1);
    let vcs = ScriptedVcs::always(true);
    {
        let paths = ws.paths();
        let owner = OwnerLock::acquire(&paths).expect("owner");
        let report =
            run_iteration(ws.root(), &invoker, &tests, &vcs, &owner).expect("iteration");
        assert_eq!(report.iter, 1);
        assert_eq!(report.status, SessionStatus::Running);
    }

    // Owner lock dropped with the session still running: the outside view
    // is a crash.
    let report = collect_status(ws.root()).expect("status");
    assert_eq!(report.status, SessionStatus::Crashed);

    resume_session(ws.root()).expect("resume");

    let invoker2 = ScriptedInvoker::new(vec![ScriptedInvoke::respond_and_touch(
        "Did the second half.\nCRITERION_DONE: 2",
        "half2.rs",
    )]);
    let tests2 = ScriptedTestRunner::passing(1);
    let outcome = run_session(ws.root(), &invoker2, &tests2, &vcs, &sentinel(&ws), |_| {}).expect("run");
    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.started_at_iter, 2);

    let record = load_session(&ws.paths().session_path).expect("load");
    assert_eq!(record.next_iter, 3);
}

/// Test failures feed escalating steering into the next iteration's context
/// and eventually trip the breaker on their own.
#[test]
fn persistent_test_failures_eventually_abort() {
    let mut cfg = WardenConfig::default();
    cfg.limits.max_consecutive_test_failures = 3;
    let ws = TestWorkspace::start_with(vec![criterion(1, "stubborn bug")], cfg)
        .expect("workspace");

    let failing = warden::io::test_run::TestReport {
        passed: false,
        exit_code: Some(1),
        timed_out: false,
    };
    let invoker = ScriptedInvoker::new(vec![
        ScriptedInvoke::respond_and_touch("Edited the fix, attempt one.", "fix1.rs"),
        ScriptedInvoke::respond_and_touch("Edited the fix, attempt two.", "fix2.rs"),
        ScriptedInvoke::respond_and_touch("Edited the fix, attempt three.", "fix3.rs"),
    ]);
    let tests = ScriptedTestRunner::new(vec![failing; 3]);
    let vcs = ScriptedVcs::always(true);

    let outcome = run_session(ws.root(), &invoker, &tests, &vcs, &sentinel(&ws), |_| {}).expect("run session");
    assert_eq!(outcome.status, SessionStatus::Aborted);
    let decision = outcome.last_decision.expect("decision");
    assert!(decision.reason.contains("failing test runs"));

    let record = load_session(&ws.paths().session_path).expect("load");
    assert_eq!(record.health.consecutive_test_failures, 3);
}

/// The audit trail records the signals that drove each decision.
#[test]
fn audit_trail_captures_signals_and_decision() {
    let ws = TestWorkspace::start_with_criteria(vec![criterion(1, "observable")])
        .expect("workspace");

    let invoker = ScriptedInvoker::new(vec![ScriptedInvoke::respond_and_touch(
        "Edited the module.\nCRITERION_DONE: 1\nCRITERION_DONE: 1",
        "m.rs",
    )]);
    let tests = ScriptedTestRunner::passing(1);
    let vcs = ScriptedVcs::always(true);

    let outcome = run_session(ws.root(), &invoker, &tests, &vcs, &sentinel(&ws), |_| {}).expect("run session");
    assert_eq!(outcome.status, SessionStatus::Completed);

    let signals_json = fs::read_to_string(
        ws.paths()
            .iteration_dir(&outcome.run_id, 1)
            .join("signals.json"),
    )
    .expect("read signals");
    let signals: serde_json::Value = serde_json::from_str(&signals_json).expect("parse signals");
    // Duplicate markers deduplicated in the persisted record.
    assert_eq!(signals["criteria_done"], serde_json::json!([1]));
}

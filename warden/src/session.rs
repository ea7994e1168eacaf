//! Orchestration of the per-iteration pipeline and the session state machine.
//!
//! One iteration runs strictly sequentially: build context → invoke agent →
//! extract signals → run tests → compute outcome → update health → update
//! budget → update criteria → decide → persist → act. No step re-enters. A
//! failed agent invocation short-circuits (no signals, no tests) into a
//! failed outcome that still flows through the health monitor.
//!
//! Persistence commits once, atomically, at the end of the pipeline. State
//! on disk therefore only ever reflects fully completed iterations, and a
//! restarted loop resumes at `next_iter`.

use std::path::Path;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{info, instrument, warn};

use crate::core::budget::BudgetStatus;
use crate::core::decision::{Decision, decide};
use crate::core::health;
use crate::core::signals::{Signals, extract};
use crate::core::types::{IterationOutcome, SessionStatus};
use crate::io::agent::{AgentInvoker, InvokeRequest};
use crate::io::audit::{AuditWriteRequest, IterationPaths, write_audit};
use crate::io::config::load_config;
use crate::io::context::build_context;
use crate::io::control::{ControlToken, OwnerLock, clear_control};
use crate::io::layout::WardenPaths;
use crate::io::state_store::{SessionRecord, load_session, save_session};
use crate::io::test_run::{TestRequest, TestRunner, run_tests_if_configured};
use crate::io::vcs::Vcs;

/// Result of one iteration, for callers and progress display.
#[derive(Debug, Clone)]
pub struct IterationReport {
    pub run_id: String,
    /// Iteration number (1-indexed).
    pub iter: u32,
    pub signals: Signals,
    pub outcome: IterationOutcome,
    pub decision: Decision,
    /// Session status after the decision was applied.
    pub status: SessionStatus,
}

/// Summary of a `warden run` invocation.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub run_id: String,
    pub started_at_iter: u32,
    pub iterations_executed: u32,
    /// Status the session ended in.
    pub status: SessionStatus,
    pub last_decision: Option<Decision>,
}

/// Execute one iteration of the control loop.
///
/// The caller must hold the session [`OwnerLock`]; passing it here keeps the
/// ownership requirement visible in the signature.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn run_iteration<A: AgentInvoker, T: TestRunner, V: Vcs>(
    root: &Path,
    invoker: &A,
    test_runner: &T,
    vcs: &V,
    _owner: &OwnerLock,
) -> Result<IterationReport> {
    let paths = WardenPaths::new(root);
    let cfg = load_config(&paths.config_path)?;

    let mut record = load_session(&paths.session_path)?;
    let run_id = record
        .run_id
        .clone()
        .ok_or_else(|| anyhow!("missing run id (run `warden start` first)"))?;
    ensure_steppable(record.status)?;

    let iter = record.next_iter;
    let iter_paths = IterationPaths::new(root, &run_id, iter);

    let prompt = build_context(&record, iter)?;

    let invocation = invoker.invoke(&InvokeRequest {
        workdir: root.to_path_buf(),
        prompt,
        model: cfg.agent.model.clone(),
        session: record.agent_session.clone(),
        result_path: iter_paths.agent_result_path.clone(),
        log_path: iter_paths.agent_log_path.clone(),
        timeout: Duration::from_secs(cfg.agent.timeout_secs),
        output_limit_bytes: cfg.output_limit_bytes,
    });

    let (signals, outcome, usage) = match invocation {
        Ok(response) => {
            let signals = extract(&response.response);

            let test_report = run_tests_if_configured(
                test_runner,
                &TestRequest {
                    workdir: root.to_path_buf(),
                    command: cfg.tests.command.clone(),
                    log_path: iter_paths.tests_log_path.clone(),
                    timeout: Duration::from_secs(cfg.tests.timeout_secs),
                    output_limit_bytes: cfg.output_limit_bytes,
                },
            )?;

            let has_changes = vcs.has_uncommitted_changes()?;
            let criterion_completed = signals
                .criteria_done
                .iter()
                .any(|n| record.criteria.is_unchecked(*n));

            let outcome = IterationOutcome {
                success: true,
                has_changes,
                test_only: signals.test_only_loop && !has_changes,
                criterion_completed,
                tests_passed: test_report.map(|r| r.passed),
                error_message: None,
            };

            if response.session.is_some() {
                record.agent_session = response.session.clone();
            }
            (
                signals,
                outcome,
                (response.input_tokens, response.output_tokens),
            )
        }
        Err(err) => {
            warn!(iter, err = %err, "agent invocation failed");
            let outcome = IterationOutcome::invocation_failed(format!("{err:#}"));
            // The failed invocation still consumed an iteration; the ledger
            // records it with zero tokens so the entry count stays honest.
            (Signals::default(), outcome, (0, 0))
        }
    };

    let limits = record.limits;
    health::update(&mut record.health, &outcome, iter);
    health::check_tripped(&mut record.health, &limits);

    record.budget.append(iter, usage.0, usage.1);

    for number in signals.criteria_done.iter().copied() {
        if record.criteria.mark_checked(number) {
            info!(iter, criterion = number, "criterion checked");
        }
    }

    let budget_status = budget_status(&record);
    let all_complete = record.criteria.all_complete();
    let decision = decide(&signals, &record.health, &budget_status, all_complete);

    write_audit(&AuditWriteRequest {
        root,
        run_id: &run_id,
        iter,
        signals: &signals,
        outcome: &outcome,
        decision: &decision,
    })?;

    record.status = SessionStatus::after_decision(decision.action);
    record.next_iter = iter + 1;
    record.last_decision = Some(decision.clone());
    save_session(&paths.session_path, &record)?;

    info!(
        iter,
        action = decision.action.as_str(),
        status = record.status.as_str(),
        "iteration committed"
    );

    Ok(IterationReport {
        run_id,
        iter,
        signals,
        outcome,
        decision,
        status: record.status,
    })
}

/// Run iterations until a non-continue decision or an operator request.
///
/// The cancellation token is checked cooperatively at iteration boundaries
/// only; an in-flight agent call is never interrupted.
pub fn run_session<
    A: AgentInvoker,
    T: TestRunner,
    V: Vcs,
    C: ControlToken,
    F: FnMut(&IterationReport),
>(
    root: &Path,
    invoker: &A,
    test_runner: &T,
    vcs: &V,
    token: &C,
    mut on_iter: F,
) -> Result<SessionOutcome> {
    let paths = WardenPaths::new(root);
    let owner = OwnerLock::acquire(&paths)?;

    let record = load_session(&paths.session_path)?;
    let run_id = record
        .run_id
        .clone()
        .ok_or_else(|| anyhow!("missing run id (run `warden start` first)"))?;
    ensure_steppable(record.status)?;
    let started_at_iter = record.next_iter;

    let mut iterations_executed = 0u32;
    loop {
        // Checkpoint: the only place operator requests take effect.
        let control = token.check();
        if control.abort {
            let status = park_session(&paths, SessionStatus::Aborted)?;
            clear_control(&paths)?;
            return Ok(session_outcome(
                &paths,
                run_id,
                started_at_iter,
                iterations_executed,
                status,
            )?);
        }
        if control.pause {
            let status = park_session(&paths, SessionStatus::Paused)?;
            clear_control(&paths)?;
            return Ok(session_outcome(
                &paths,
                run_id,
                started_at_iter,
                iterations_executed,
                status,
            )?);
        }

        let report = run_iteration(root, invoker, test_runner, vcs, &owner)?;
        iterations_executed += 1;
        on_iter(&report);

        if report.status != SessionStatus::Running {
            return Ok(SessionOutcome {
                run_id,
                started_at_iter,
                iterations_executed,
                status: report.status,
                last_decision: Some(report.decision),
            });
        }
    }
}

/// Return a parked (paused/verify/aborted/crashed) session to `Running`.
///
/// Refuses while another live process owns the state. Clears any pending
/// operator sentinels so the next `run` does not immediately re-park.
pub fn resume_session(root: &Path) -> Result<SessionStatus> {
    let paths = WardenPaths::new(root);
    let owner = OwnerLock::acquire(&paths)?;

    let mut record = load_session(&paths.session_path)?;
    if record.run_id.is_none() {
        return Err(anyhow!("missing run id (run `warden start` first)"));
    }
    match record.status {
        SessionStatus::Completed => {
            return Err(anyhow!("session is completed; start a new session instead"));
        }
        SessionStatus::Initialized => {
            return Err(anyhow!("session has not run yet; use `warden run`"));
        }
        // A session persisted as Running with no live owner is the lazy
        // crash-detection case; resuming it is exactly what `resume` is for.
        SessionStatus::Running
        | SessionStatus::Paused
        | SessionStatus::Verify
        | SessionStatus::Aborted
        | SessionStatus::Crashed => {}
    }

    clear_control(&paths)?;
    record.status = SessionStatus::Running;
    save_session(&paths.session_path, &record)?;
    drop(owner);
    Ok(SessionStatus::Running)
}

fn ensure_steppable(status: SessionStatus) -> Result<()> {
    match status {
        SessionStatus::Initialized | SessionStatus::Running => Ok(()),
        other => Err(anyhow!(
            "session is {} (use `warden resume` to return it to running)",
            other.as_str()
        )),
    }
}

fn park_session(paths: &WardenPaths, status: SessionStatus) -> Result<SessionStatus> {
    let mut record = load_session(&paths.session_path)?;
    record.status = status;
    save_session(&paths.session_path, &record)?;
    info!(status = status.as_str(), "operator request honored");
    Ok(status)
}

fn session_outcome(
    paths: &WardenPaths,
    run_id: String,
    started_at_iter: u32,
    iterations_executed: u32,
    status: SessionStatus,
) -> Result<SessionOutcome> {
    let record = load_session(&paths.session_path)?;
    Ok(SessionOutcome {
        run_id,
        started_at_iter,
        iterations_executed,
        status,
        last_decision: record.last_decision,
    })
}

fn budget_status(record: &SessionRecord) -> BudgetStatus {
    record
        .budget
        .status(record.limits.max_tokens, record.limits.max_iterations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_not_steppable() {
        assert!(ensure_steppable(SessionStatus::Running).is_ok());
        assert!(ensure_steppable(SessionStatus::Initialized).is_ok());
        for status in [
            SessionStatus::Paused,
            SessionStatus::Verify,
            SessionStatus::Completed,
            SessionStatus::Aborted,
        ] {
            let err = ensure_steppable(status).expect_err("should refuse");
            assert!(err.to_string().contains(status.as_str()));
        }
    }
}

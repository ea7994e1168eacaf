//! Status surface assembly for monitoring tooling.
//!
//! Reports what the core already knows (decision, health, budget, criteria,
//! session status) without re-deriving any control logic. Crash detection is
//! lazy: a session persisted as running whose owner process is dead reads as
//! crashed here, nothing rewrites the stored state.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use crate::core::budget::BudgetStatus;
use crate::core::decision::Decision;
use crate::core::health::HealthState;
use crate::core::types::SessionStatus;
use crate::io::control::{owner_alive, poll_control};
use crate::io::layout::WardenPaths;
use crate::io::state_store::load_session;

/// Everything surrounding tooling needs for a status display.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub run_id: Option<String>,
    /// Effective status, with lazy crash detection applied.
    pub status: SessionStatus,
    pub owner_alive: bool,
    pub next_iter: u32,
    pub health: HealthState,
    pub budget: BudgetStatus,
    pub criteria_checked: usize,
    pub criteria_total: usize,
    pub all_criteria_complete: bool,
    pub pause_requested: bool,
    pub abort_requested: bool,
    pub last_decision: Option<Decision>,
}

/// A session persisted as running must have a live owner; a dead one means
/// the loop process died mid-session.
pub fn effective_status(persisted: SessionStatus, owner_alive: bool) -> SessionStatus {
    if persisted == SessionStatus::Running && !owner_alive {
        SessionStatus::Crashed
    } else {
        persisted
    }
}

/// Assemble the status report from persisted state.
pub fn collect_status(root: &Path) -> Result<StatusReport> {
    let paths = WardenPaths::new(root);
    let record = load_session(&paths.session_path)?;
    let alive = owner_alive(&paths)?;
    let control = poll_control(&paths);

    Ok(StatusReport {
        run_id: record.run_id.clone(),
        status: effective_status(record.status, alive),
        owner_alive: alive,
        next_iter: record.next_iter,
        health: record.health.clone(),
        budget: record
            .budget
            .status(record.limits.max_tokens, record.limits.max_iterations),
        criteria_checked: record.criteria.checked_count(),
        criteria_total: record.criteria.len(),
        all_criteria_complete: record.criteria.all_complete(),
        pause_requested: control.pause,
        abort_requested: control.abort,
        last_decision: record.last_decision,
    })
}

//! Orchestration for starting a new session.
//!
//! A session is one run of the control loop against one task definition,
//! identified by a stable `run_id`. Starting a session snapshots the
//! checklist into zeroed session state; health and budget begin empty and
//! only an explicit new start (or `reset`) ever zeroes them again.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};

use crate::core::types::SessionStatus;
use crate::io::checklist::load_checklist;
use crate::io::config::load_config;
use crate::io::control::{OwnerLock, clear_control};
use crate::io::layout::{InitOptions, WardenPaths, init_layout};
use crate::io::state_store::{SessionRecord, save_session};

/// Outcome of `warden start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOutcome {
    pub run_id: String,
    pub criteria_count: usize,
}

/// Start a fresh session in `root`.
///
/// - Ensures `.warden/` scaffolding exists (runs init if missing).
/// - Validates config and the checklist definition.
/// - Refuses while a live process owns the session state.
/// - Persists zeroed session state with the checklist snapshot.
pub fn start_session(root: &Path) -> Result<StartOutcome> {
    debug!(root = %root.display(), "starting session");
    let paths = WardenPaths::new(root);

    if !paths.warden_dir.exists() {
        init_layout(root, &InitOptions { force: false }).context("warden init")?;
    }

    let cfg = load_config(&paths.config_path)?;

    let criteria = load_checklist(&paths.checklist_path)?;
    if criteria.is_empty() {
        // An empty checklist can never complete; refusing here beats a
        // session that only ever ends by exhausting its budget.
        return Err(anyhow!(
            "checklist {} has no criteria",
            paths.checklist_path.display()
        ));
    }

    let owner = OwnerLock::acquire(&paths)?;
    clear_control(&paths)?;

    let run_id = generate_run_id()?;
    let record = SessionRecord {
        run_id: Some(run_id.clone()),
        status: SessionStatus::Initialized,
        // Limits are frozen here; later config edits apply to the next
        // session only.
        limits: cfg.limits,
        criteria,
        ..SessionRecord::default()
    };
    save_session(&paths.session_path, &record)?;
    drop(owner);

    info!(run_id = %run_id, criteria = record.criteria.len(), "session started");
    Ok(StartOutcome {
        run_id,
        criteria_count: record.criteria.len(),
    })
}

/// Stable-enough identifier: seconds since the epoch in hex. Sessions are
/// started by humans, not in tight loops; collisions would need two starts
/// in the same second against the same state directory, which the owner
/// lock already serializes.
fn generate_run_id() -> Result<String> {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock before epoch")?
        .as_secs();
    Ok(format!("run-{secs:x}"))
}

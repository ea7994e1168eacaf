//! Persisted session state (`.warden/state/session.json`).
//!
//! Health, budget, criteria, and run bookkeeping persist as one document
//! written atomically once per fully completed iteration. A crash between
//! iterations therefore never leaves partially-applied state: either the
//! whole iteration committed or none of it did, and a restarted loop resumes
//! at `next_iter`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::budget::BudgetLedger;
use crate::core::criteria::Criteria;
use crate::core::decision::Decision;
use crate::core::health::HealthState;
use crate::core::types::{SessionStatus, Thresholds};

/// The four persisted records plus run bookkeeping, as one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    /// Identifier for the current session.
    pub run_id: Option<String>,
    pub status: SessionStatus,
    /// Next iteration number (1-indexed, monotonically increasing).
    pub next_iter: u32,
    /// Limits snapshotted at session start; config edits made while a
    /// session is live apply to the next session, not this one.
    #[serde(default)]
    pub limits: Thresholds,
    /// Opaque conversation handle returned by the agent, when it supports
    /// resuming one.
    pub agent_session: Option<String>,
    pub health: HealthState,
    pub budget: BudgetLedger,
    pub criteria: Criteria,
    /// Decision from the previous iteration, kept for status surfaces and
    /// the next iteration's context.
    pub last_decision: Option<Decision>,
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self {
            run_id: None,
            status: SessionStatus::Initialized,
            next_iter: 1,
            limits: Thresholds::default(),
            agent_session: None,
            health: HealthState::default(),
            budget: BudgetLedger::default(),
            criteria: Criteria::default(),
            last_decision: None,
        }
    }
}

/// Load session state from disk.
///
/// Missing or corrupt state loads as the zeroed default rather than failing:
/// the store self-heals and the caller decides whether a fresh default is
/// usable (commands that need a started session check `run_id`).
pub fn load_session(path: &Path) -> Result<SessionRecord> {
    if !path.exists() {
        debug!(path = %path.display(), "no session state, using default");
        return Ok(SessionRecord::default());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read session state {}", path.display()))?;
    match serde_json::from_str(&contents) {
        Ok(record) => Ok(record),
        Err(err) => {
            warn!(path = %path.display(), %err, "corrupt session state, resetting to default");
            Ok(SessionRecord::default())
        }
    }
}

/// Atomically write session state to disk (temp file + rename).
pub fn save_session(path: &Path, record: &SessionRecord) -> Result<()> {
    debug!(
        path = %path.display(),
        run_id = ?record.run_id,
        status = record.status.as_str(),
        next_iter = record.next_iter,
        "writing session state"
    );
    let mut buf = serde_json::to_string_pretty(record)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("session state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp session state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("replace session state {}", path.display()))?;
    Ok(())
}

//! Per-iteration audit trail under `.warden/iterations/`.
//!
//! Product artifacts, always written, unaffected by `RUST_LOG`: extracted
//! signals, the computed outcome, and the decision for every iteration, next
//! to the agent and test logs the adapters wrote earlier. The trail is how a
//! pause or abort gets audited after the fact.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::decision::Decision;
use crate::core::signals::Signals;
use crate::core::types::IterationOutcome;
use crate::io::layout::WardenPaths;

#[derive(Debug, Clone)]
pub struct IterationPaths {
    pub dir: PathBuf,
    pub signals_path: PathBuf,
    pub outcome_path: PathBuf,
    pub decision_path: PathBuf,
    pub agent_log_path: PathBuf,
    pub agent_result_path: PathBuf,
    pub tests_log_path: PathBuf,
}

impl IterationPaths {
    pub fn new(root: &Path, run_id: &str, iter: u32) -> Self {
        let dir = WardenPaths::new(root).iteration_dir(run_id, iter);
        Self {
            dir: dir.clone(),
            signals_path: dir.join("signals.json"),
            outcome_path: dir.join("outcome.json"),
            decision_path: dir.join("decision.json"),
            agent_log_path: dir.join("agent.log"),
            agent_result_path: dir.join("result.json"),
            tests_log_path: dir.join("tests.log"),
        }
    }
}

pub struct AuditWriteRequest<'a> {
    pub root: &'a Path,
    pub run_id: &'a str,
    pub iter: u32,
    pub signals: &'a Signals,
    pub outcome: &'a IterationOutcome,
    pub decision: &'a Decision,
}

/// Write the iteration's audit records. Deterministic order keeps the trail
/// stable.
pub fn write_audit(request: &AuditWriteRequest<'_>) -> Result<IterationPaths> {
    let paths = IterationPaths::new(request.root, request.run_id, request.iter);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create iteration dir {}", paths.dir.display()))?;

    write_json(&paths.signals_path, request.signals)?;
    write_json(&paths.outcome_path, request.outcome)?;
    write_json(&paths.decision_path, request.decision)?;

    Ok(paths)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

//! Session configuration stored under `.warden/state/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::Thresholds;

/// Session configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values. The limits are
/// immutable for a session: `warden start` snapshots them and later edits
/// only apply to the next session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WardenConfig {
    /// Truncate agent/test logs beyond this many bytes. Kept ahead of the
    /// tables so the TOML serializer accepts the document.
    pub output_limit_bytes: usize,

    /// Circuit-breaker thresholds and budget ceilings.
    pub limits: Thresholds,

    pub agent: AgentConfig,

    pub tests: TestConfig,
}

/// How to invoke the external agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Argv prefix for the agent process. The invoker appends `--model`,
    /// `--session` (when resuming a handle), and the result-file path, and
    /// feeds the rendered context on stdin.
    pub command: Vec<String>,
    /// Model identifier forwarded to the agent process. Empty means the
    /// agent's own default.
    pub model: String,
    /// Wall-clock bound for one agent invocation.
    pub timeout_secs: u64,
}

/// How to run the project's verification command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestConfig {
    /// Test command argv. Empty disables the test phase; the per-iteration
    /// test result then stays unknown.
    pub command: Vec<String>,
    /// Wall-clock bound for one test run; expiry counts as a failed run.
    pub timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: vec!["agent-shim".to_string()],
            model: String::new(),
            timeout_secs: 30 * 60,
        }
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            command: vec!["cargo".to_string(), "test".to_string()],
            timeout_secs: 5 * 60,
        }
    }
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            output_limit_bytes: 100_000,
            limits: Thresholds::default(),
            agent: AgentConfig::default(),
            tests: TestConfig::default(),
        }
    }
}

impl WardenConfig {
    pub fn validate(&self) -> Result<()> {
        if self.agent.command.is_empty() || self.agent.command[0].trim().is_empty() {
            return Err(anyhow!("agent.command must be a non-empty array"));
        }
        if self.agent.timeout_secs == 0 {
            return Err(anyhow!("agent.timeout_secs must be > 0"));
        }
        if self.tests.timeout_secs == 0 {
            return Err(anyhow!("tests.timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.limits.max_iterations == 0 {
            return Err(anyhow!("limits.max_iterations must be > 0"));
        }
        if self.limits.max_tokens == 0 {
            return Err(anyhow!("limits.max_tokens must be > 0"));
        }
        if self.limits.max_consecutive_errors == 0
            || self.limits.max_consecutive_no_change == 0
            || self.limits.max_consecutive_test_only == 0
            || self.limits.max_consecutive_test_failures == 0
        {
            return Err(anyhow!("limits thresholds must all be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `WardenConfig::default()`.
pub fn load_config(path: &Path) -> Result<WardenConfig> {
    if !path.exists() {
        let cfg = WardenConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: WardenConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &WardenConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

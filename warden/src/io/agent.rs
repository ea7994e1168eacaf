//! Agent invoker abstraction.
//!
//! The [`AgentInvoker`] trait decouples the iteration loop from the actual
//! agent backend. The process-backed default spawns a configured argv, feeds
//! the rendered context on stdin, and reads a JSON result file the agent
//! process must write. Tests use scripted invokers that return predetermined
//! responses without spawning processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_command_with_timeout;

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    /// Working directory for the agent process.
    pub workdir: PathBuf,
    /// Rendered context text fed to the agent on stdin.
    pub prompt: String,
    /// Model identifier; empty means the agent's default.
    pub model: String,
    /// Conversation handle from a previous iteration, when the agent
    /// supports resuming one.
    pub session: Option<String>,
    /// Path where the agent process must write its JSON result.
    pub result_path: PathBuf,
    /// Path to write the invocation's stdout/stderr log.
    pub log_path: PathBuf,
    /// Maximum time to wait for the invocation to complete.
    pub timeout: Duration,
    /// Truncate captured output beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// What one invocation produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResponse {
    /// The agent's free-text response.
    pub response: String,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    /// Handle for resuming the conversation next iteration, if any.
    #[serde(default)]
    pub session: Option<String>,
}

/// Abstraction over agent backends.
pub trait AgentInvoker {
    /// Run the agent once. Must produce the response text and token usage.
    fn invoke(&self, request: &InvokeRequest) -> Result<AgentResponse>;
}

/// Invoker that spawns the configured agent command.
///
/// The command is invoked as `<argv...> [--model M] [--session S]
/// <result-path>` with the prompt on stdin. The process must exit zero and
/// write an [`AgentResponse`] JSON document to the result path; a wrapper
/// script adapts whatever real agent CLI is in use to this contract.
pub struct ProcessInvoker {
    command: Vec<String>,
}

impl ProcessInvoker {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl AgentInvoker for ProcessInvoker {
    #[instrument(skip_all, fields(timeout_secs = request.timeout.as_secs()))]
    fn invoke(&self, request: &InvokeRequest) -> Result<AgentResponse> {
        info!(workdir = %request.workdir.display(), "starting agent invocation");

        let program = self
            .command
            .first()
            .ok_or_else(|| anyhow!("agent command is empty"))?;
        if let Some(parent) = request.result_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create result dir {}", parent.display()))?;
        }

        let mut cmd = Command::new(program);
        cmd.args(&self.command[1..]);
        if !request.model.is_empty() {
            cmd.arg("--model").arg(&request.model);
        }
        if let Some(session) = &request.session {
            cmd.arg("--session").arg(session);
        }
        cmd.arg(&request.result_path).current_dir(&request.workdir);

        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .context("run agent command")?;

        write_invocation_log(&request.log_path, &output.render_log("agent"))?;

        if output.timed_out {
            warn!(
                timeout_secs = request.timeout.as_secs(),
                "agent invocation timed out"
            );
            return Err(anyhow!(
                "agent invocation timed out after {:?}",
                request.timeout
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent invocation failed");
            return Err(anyhow!(
                "agent invocation failed with status {:?}",
                output.status.code()
            ));
        }

        let response = read_result(&request.result_path)?;
        debug!(
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "agent invocation completed"
        );
        Ok(response)
    }
}

fn read_result(path: &Path) -> Result<AgentResponse> {
    if !path.exists() {
        return Err(anyhow!("missing agent result {}", path.display()));
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read agent result {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

fn write_invocation_log(path: &Path, body: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create agent log dir {}", parent.display()))?;
    }
    fs::write(path, body).with_context(|| format!("write agent log {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(temp: &Path) -> InvokeRequest {
        InvokeRequest {
            workdir: temp.to_path_buf(),
            prompt: "prompt".to_string(),
            model: String::new(),
            session: None,
            result_path: temp.join("result.json"),
            log_path: temp.join("agent.log"),
            timeout: Duration::from_secs(5),
            output_limit_bytes: 10_000,
        }
    }

    /// A shim that copies stdin into the result file's `response` field,
    /// standing in for a real agent CLI wrapper.
    #[test]
    fn process_invoker_reads_the_result_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let shim = "out=$(cat -); printf '{\"response\": \"%s\", \"input_tokens\": 11, \"output_tokens\": 7}' \"$out\" > \"$1\"";
        let invoker = ProcessInvoker::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            shim.to_string(),
            "shim".to_string(),
        ]);

        let req = request(temp.path());
        let response = invoker.invoke(&req).expect("invoke");
        assert_eq!(response.response, "prompt");
        assert_eq!(response.input_tokens, 11);
        assert_eq!(response.output_tokens, 7);
        assert!(req.log_path.is_file());
    }

    #[test]
    fn missing_result_file_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        // Consumes stdin, exits zero, never writes the result file.
        let invoker = ProcessInvoker::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "cat - > /dev/null".to_string(),
            "shim".to_string(),
        ]);
        let err = invoker.invoke(&request(temp.path())).expect_err("invoke");
        assert!(err.to_string().contains("missing agent result"));
    }

    #[test]
    fn nonzero_exit_is_an_error_and_still_logs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let invoker = ProcessInvoker::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "cat - > /dev/null; exit 3".to_string(),
            "shim".to_string(),
        ]);
        let req = request(temp.path());
        let err = invoker.invoke(&req).expect_err("invoke");
        assert!(err.to_string().contains("failed with status"));
        assert!(req.log_path.is_file());
    }
}

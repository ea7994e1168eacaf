//! Test runner adapter for the project's verification command.
//!
//! Unlike the agent invocation, a failing or timed-out test run is a normal
//! report (`passed = false`), not an error: test failures are expected during
//! normal work and feed the health monitor, not the error path.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

#[derive(Debug, Clone)]
pub struct TestRequest {
    pub workdir: PathBuf,
    /// Test command argv; first element is the program.
    pub command: Vec<String>,
    pub log_path: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Result of one test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    pub passed: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

pub trait TestRunner {
    fn run(&self, request: &TestRequest) -> Result<TestReport>;
}

/// Runner that spawns the configured test command.
pub struct CommandTestRunner;

impl TestRunner for CommandTestRunner {
    #[instrument(skip_all, fields(timeout_secs = request.timeout.as_secs()))]
    fn run(&self, request: &TestRequest) -> Result<TestReport> {
        let program = request
            .command
            .first()
            .context("test command is empty")?;
        let mut child = Command::new(program)
            .args(&request.command[1..])
            .current_dir(&request.workdir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn test command {program}"))?;

        let status = match child
            .wait_timeout(request.timeout)
            .context("wait for test timeout")?
        {
            Some(status) => status,
            None => {
                warn!(
                    timeout_secs = request.timeout.as_secs(),
                    "test run timed out, killing"
                );
                child.kill().context("kill test process")?;
                child.wait().context("wait test process")?;
                write_test_log(
                    &request.log_path,
                    b"",
                    b"test run timed out",
                    request.output_limit_bytes,
                )?;
                return Ok(TestReport {
                    passed: false,
                    exit_code: None,
                    timed_out: true,
                });
            }
        };

        let output = child.wait_with_output().context("collect test output")?;
        write_test_log(
            &request.log_path,
            &output.stdout,
            &output.stderr,
            request.output_limit_bytes,
        )?;

        debug!(exit_code = ?status.code(), passed = status.success(), "test run finished");
        Ok(TestReport {
            passed: status.success(),
            exit_code: status.code(),
            timed_out: false,
        })
    }
}

/// Run the tests when a command is configured; `None` keeps the tri-state
/// test result unknown.
pub fn run_tests_if_configured<R: TestRunner>(
    runner: &R,
    request: &TestRequest,
) -> Result<Option<TestReport>> {
    if request.command.is_empty() {
        return Ok(None);
    }
    runner.run(request).map(Some)
}

fn write_test_log(
    path: &PathBuf,
    stdout: &[u8],
    stderr: &[u8],
    output_limit: usize,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create test log dir {}", parent.display()))?;
    }
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(&String::from_utf8_lossy(stdout));
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&String::from_utf8_lossy(stderr));

    if buf.len() > output_limit {
        let truncated = format!(
            "{}\n[truncated {} bytes]\n",
            &buf[..output_limit],
            buf.len() - output_limit
        );
        fs::write(path, truncated)
            .with_context(|| format!("write test log {}", path.display()))?;
        return Ok(());
    }

    fs::write(path, buf).with_context(|| format!("write test log {}", path.display()))?;
    Ok(())
}

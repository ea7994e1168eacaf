//! Test-only helpers: scripted collaborators and workspace builders.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Result, anyhow};

use crate::core::criteria::{Criteria, Criterion};
use crate::io::agent::{AgentInvoker, AgentResponse, InvokeRequest};
use crate::io::checklist::render_checklist;
use crate::io::config::{WardenConfig, write_config};
use crate::io::layout::{InitOptions, WardenPaths, init_layout};
use crate::io::test_run::{TestReport, TestRequest, TestRunner};
use crate::io::vcs::Vcs;
use crate::start::{StartOutcome, start_session};

/// One scripted agent turn.
#[derive(Debug, Clone)]
pub enum ScriptedInvoke {
    /// Produce a response; optionally create a file under the workdir first,
    /// simulating the agent editing the project.
    Respond {
        text: String,
        input_tokens: u64,
        output_tokens: u64,
        touch: Option<String>,
    },
    /// Fail the invocation (spawn error, timeout, nonzero exit).
    Fail { message: String },
}

impl ScriptedInvoke {
    pub fn respond(text: impl Into<String>) -> Self {
        Self::Respond {
            text: text.into(),
            input_tokens: 100,
            output_tokens: 50,
            touch: None,
        }
    }

    pub fn respond_and_touch(text: impl Into<String>, touch: impl Into<String>) -> Self {
        Self::Respond {
            text: text.into(),
            input_tokens: 100,
            output_tokens: 50,
            touch: Some(touch.into()),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail {
            message: message.into(),
        }
    }
}

/// Invoker that replays a queue of scripted turns.
pub struct ScriptedInvoker {
    queue: Mutex<VecDeque<ScriptedInvoke>>,
}

impl ScriptedInvoker {
    pub fn new(turns: Vec<ScriptedInvoke>) -> Self {
        Self {
            queue: Mutex::new(turns.into()),
        }
    }

    pub fn assert_drained(&self) -> Result<()> {
        let queue = self.queue.lock().expect("queue lock");
        if queue.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("{} scripted invocations left unused", queue.len()))
        }
    }
}

impl AgentInvoker for ScriptedInvoker {
    fn invoke(&self, request: &InvokeRequest) -> Result<AgentResponse> {
        let turn = self
            .queue
            .lock()
            .expect("queue lock")
            .pop_front()
            .ok_or_else(|| anyhow!("scripted invoker exhausted"))?;
        match turn {
            ScriptedInvoke::Respond {
                text,
                input_tokens,
                output_tokens,
                touch,
            } => {
                if let Some(rel) = touch {
                    fs::write(request.workdir.join(rel), "scripted edit\n")?;
                }
                if let Some(parent) = request.log_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&request.log_path, "scripted invocation\n")?;
                Ok(AgentResponse {
                    response: text,
                    input_tokens,
                    output_tokens,
                    session: None,
                })
            }
            ScriptedInvoke::Fail { message } => Err(anyhow!(message)),
        }
    }
}

/// Test runner that replays a queue of reports.
pub struct ScriptedTestRunner {
    queue: Mutex<VecDeque<TestReport>>,
}

impl ScriptedTestRunner {
    pub fn new(reports: Vec<TestReport>) -> Self {
        Self {
            queue: Mutex::new(reports.into()),
        }
    }

    pub fn passing(count: usize) -> Self {
        Self::new(vec![
            TestReport {
                passed: true,
                exit_code: Some(0),
                timed_out: false,
            };
            count
        ])
    }

    pub fn assert_drained(&self) -> Result<()> {
        let queue = self.queue.lock().expect("queue lock");
        if queue.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("{} scripted test reports left unused", queue.len()))
        }
    }
}

impl TestRunner for ScriptedTestRunner {
    fn run(&self, request: &TestRequest) -> Result<TestReport> {
        let report = self
            .queue
            .lock()
            .expect("queue lock")
            .pop_front()
            .ok_or_else(|| anyhow!("scripted test runner exhausted"))?;
        if let Some(parent) = request.log_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&request.log_path, "scripted test run\n")?;
        Ok(report)
    }
}

/// Vcs double returning scripted change reports.
pub struct ScriptedVcs {
    queue: Mutex<VecDeque<bool>>,
    default: bool,
}

impl ScriptedVcs {
    /// Always report the same answer.
    pub fn always(changes: bool) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            default: changes,
        }
    }

    /// Report the queued answers in order, then fall back to `default`.
    pub fn sequence(answers: Vec<bool>, default: bool) -> Self {
        Self {
            queue: Mutex::new(answers.into()),
            default,
        }
    }
}

impl Vcs for ScriptedVcs {
    fn has_uncommitted_changes(&self) -> Result<bool> {
        Ok(self
            .queue
            .lock()
            .expect("queue lock")
            .pop_front()
            .unwrap_or(self.default))
    }
}

/// Deterministic criterion for building test checklists.
pub fn criterion(number: u32, text: &str) -> Criterion {
    Criterion {
        number,
        text: text.to_string(),
        checked: false,
    }
}

/// Temp workspace with `.warden/` scaffolding and a started session.
pub struct TestWorkspace {
    temp: tempfile::TempDir,
    pub start: StartOutcome,
}

impl TestWorkspace {
    /// Initialize a workspace with the given checklist and start a session.
    pub fn start_with_criteria(criteria: Vec<Criterion>) -> Result<Self> {
        Self::start_with(criteria, WardenConfig::default())
    }

    /// Same, with explicit config written before the session starts so the
    /// limits snapshot picks it up.
    pub fn start_with(criteria: Vec<Criterion>, cfg: WardenConfig) -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let paths = init_layout(temp.path(), &InitOptions { force: false })?;
        write_config(&paths.config_path, &cfg)?;
        let checklist = Criteria::new(criteria).map_err(|err| anyhow!(err))?;
        fs::write(&paths.checklist_path, render_checklist(&checklist)?)?;
        let start = start_session(temp.path())?;
        Ok(Self { temp, start })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn paths(&self) -> WardenPaths {
        WardenPaths::new(self.temp.path())
    }
}

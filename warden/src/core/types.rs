//! Shared deterministic types for the control core.
//!
//! These types define stable contracts between core components. They should
//! not depend on external state or I/O and must remain deterministic across
//! runs.

use serde::{Deserialize, Serialize};

use crate::core::decision::Action;

/// Result of one loop iteration, assembled from collaborator results and
/// extracted signals before any state update runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationOutcome {
    /// The agent invocation completed and produced a response.
    pub success: bool,
    /// The working tree has uncommitted changes after the iteration.
    pub has_changes: bool,
    /// The response talked only about running tests while nothing changed.
    pub test_only: bool,
    /// At least one previously unchecked criterion was signaled done.
    pub criterion_completed: bool,
    /// Tri-state test result. `None` when no test command is configured.
    pub tests_passed: Option<bool>,
    /// Failure detail when `success` is false.
    pub error_message: Option<String>,
}

impl IterationOutcome {
    /// Outcome for an iteration whose agent invocation failed outright.
    ///
    /// The pipeline short-circuits before signal extraction and tests, so
    /// everything except the error is absent.
    pub fn invocation_failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            has_changes: false,
            test_only: false,
            criterion_completed: false,
            tests_passed: None,
            error_message: Some(message.into()),
        }
    }
}

/// Session limits, immutable once a session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Consecutive failed agent invocations before the breaker trips.
    pub max_consecutive_errors: u32,
    /// Consecutive successful iterations without progress before tripping.
    pub max_consecutive_no_change: u32,
    /// Consecutive test-only iterations before tripping.
    pub max_consecutive_test_only: u32,
    /// Consecutive failing test runs before tripping.
    pub max_consecutive_test_failures: u32,
    /// Hard ceiling on iterations for the session.
    pub max_iterations: u32,
    /// Hard ceiling on cumulative tokens for the session.
    pub max_tokens: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_consecutive_errors: 3,
            max_consecutive_no_change: 5,
            max_consecutive_test_only: 3,
            max_consecutive_test_failures: 5,
            max_iterations: 50,
            max_tokens: 1_000_000,
        }
    }
}

/// Session lifecycle state owned by the control loop.
///
/// `Verify`, `Completed`, and `Aborted` are terminal pending external action;
/// `Crashed` is never persisted, only derived when a non-terminal session has
/// a dead owning process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Initialized,
    Running,
    Paused,
    Verify,
    Completed,
    Aborted,
    Crashed,
}

impl SessionStatus {
    /// Status the session moves to when a decision's action is applied.
    pub fn after_decision(action: Action) -> Self {
        match action {
            Action::Continue => Self::Running,
            Action::Complete => Self::Completed,
            Action::Pause => Self::Paused,
            Action::Verify => Self::Verify,
            Action::Abort => Self::Aborted,
        }
    }

    /// Terminal pending external action (no further iterations run).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Verify | Self::Completed | Self::Aborted)
    }

    /// States an operator `resume` may return to `Running`.
    pub fn is_resumable(self) -> bool {
        matches!(
            self,
            Self::Paused | Self::Crashed | Self::Aborted | Self::Verify
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Verify => "verify",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Crashed => "crashed",
        }
    }
}

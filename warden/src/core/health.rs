//! Circuit breaker over consecutive-failure counters.
//!
//! The monitor watches for sustained lack of progress rather than single
//! failures: every counter tracks a *consecutive* streak and resets the
//! moment the streak breaks. Trip evaluation is priority-ordered so one
//! iteration breaching several thresholds still reports exactly one reason.

use serde::{Deserialize, Serialize};

use crate::core::types::{IterationOutcome, Thresholds};

/// Persisted health counters for one session. All counters are non-negative
/// by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthState {
    pub consecutive_errors: u32,
    pub consecutive_no_change: u32,
    pub consecutive_test_only: u32,
    pub consecutive_test_failures: u32,
    /// Message from the most recent failed invocation.
    pub last_error: Option<String>,
    /// Iteration number of the most recent successful invocation.
    pub last_success_iter: Option<u32>,
    pub tripped: bool,
    pub trip_reason: Option<String>,
}

/// Fold one iteration outcome into the counters.
pub fn update(state: &mut HealthState, outcome: &IterationOutcome, iteration: u32) {
    if outcome.success {
        state.consecutive_errors = 0;
        state.last_success_iter = Some(iteration);
    } else {
        state.consecutive_errors += 1;
        state.last_error = Some(
            outcome
                .error_message
                .clone()
                .unwrap_or_else(|| "agent invocation failed".to_string()),
        );
    }

    let progress = outcome.has_changes || outcome.criterion_completed;
    if outcome.success && !progress {
        state.consecutive_no_change += 1;
    } else {
        state.consecutive_no_change = 0;
    }

    if outcome.test_only {
        state.consecutive_test_only += 1;
    } else if outcome.success {
        state.consecutive_test_only = 0;
    }

    match outcome.tests_passed {
        Some(false) => state.consecutive_test_failures += 1,
        Some(true) => state.consecutive_test_failures = 0,
        None => {}
    }
}

/// Evaluate the breaker in fixed priority order: errors, no-change,
/// test-only, test-failures. The first breached threshold wins and only that
/// reason is reported, even when several are exceeded at once.
///
/// Invocation errors are checked first because they indicate a broken loop;
/// test failures are checked last because they occur transiently during
/// normal work.
pub fn check_tripped(state: &mut HealthState, thresholds: &Thresholds) -> bool {
    let breach = if state.consecutive_errors >= thresholds.max_consecutive_errors {
        Some(format!(
            "{} consecutive agent errors (limit {})",
            state.consecutive_errors, thresholds.max_consecutive_errors
        ))
    } else if state.consecutive_no_change >= thresholds.max_consecutive_no_change {
        Some(format!(
            "{} consecutive iterations without progress (limit {})",
            state.consecutive_no_change, thresholds.max_consecutive_no_change
        ))
    } else if state.consecutive_test_only >= thresholds.max_consecutive_test_only {
        Some(format!(
            "{} consecutive test-only iterations (limit {})",
            state.consecutive_test_only, thresholds.max_consecutive_test_only
        ))
    } else if state.consecutive_test_failures >= thresholds.max_consecutive_test_failures {
        Some(format!(
            "{} consecutive failing test runs (limit {})",
            state.consecutive_test_failures, thresholds.max_consecutive_test_failures
        ))
    } else {
        None
    };

    state.tripped = breach.is_some();
    state.trip_reason = breach;
    state.tripped
}

/// Zero all counters and clear the trip. Operator reset or new-session init.
pub fn reset(state: &mut HealthState) {
    *state = HealthState::default();
}

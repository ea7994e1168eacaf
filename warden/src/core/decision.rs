//! Decision cascade fusing signals, health, budget, and checklist progress.
//!
//! One pure function turns everything known about an iteration into a single
//! authoritative [`Decision`]. The rules form an ordered cascade and the
//! first matching rule wins; the order itself is the contract:
//!
//! 1. structural completion (all criteria checked) outranks the agent's
//!    self-report, because self-reports can be wrong;
//! 2. explicit requests for human attention outrank automated aborts,
//!    because they are the agent asking for help;
//! 3. safety aborts outrank soft heuristics, so a lucky phrase match cannot
//!    keep a runaway loop alive.

use serde::{Deserialize, Serialize};

use crate::core::budget::BudgetStatus;
use crate::core::health::HealthState;
use crate::core::signals::Signals;

/// Distinct completion phrases required before soft evidence is worth a
/// verification pause.
pub const SOFT_COMPLETION_THRESHOLD: u32 = 3;

/// What the loop does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Continue,
    Complete,
    Pause,
    Verify,
    Abort,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Complete => "complete",
            Self::Pause => "pause",
            Self::Verify => "verify",
            Self::Abort => "abort",
        }
    }
}

/// How sure the cascade is about its pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
}

/// The single authoritative verdict for one iteration. Ephemeral; recomputed
/// every iteration and persisted only for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub reason: String,
    pub confidence: Confidence,
    pub requires_human: bool,
    pub warning: Option<String>,
}

/// Evaluate the cascade. Referentially transparent: identical inputs always
/// yield an identical decision.
pub fn decide(
    signals: &Signals,
    health: &HealthState,
    budget: &BudgetStatus,
    all_criteria_complete: bool,
) -> Decision {
    // Rules 1-2: checked criteria are authoritative, with or without the
    // agent's exit marker.
    if all_criteria_complete {
        let reason = if signals.exit_signal {
            "all criteria checked and the agent declared completion".to_string()
        } else {
            "all criteria checked".to_string()
        };
        return Decision {
            action: Action::Complete,
            reason,
            confidence: Confidence::High,
            requires_human: false,
            warning: None,
        };
    }

    // Rule 3: completion declared, zero tool activity, checklist incomplete.
    // The classic hallucinated-completion shape; a human has to look.
    if signals.exit_signal && signals.tool_calls.total == 0 {
        return Decision {
            action: Action::Pause,
            reason: "completion declared with no tool activity while criteria remain unchecked"
                .to_string(),
            confidence: Confidence::High,
            requires_human: true,
            warning: None,
        };
    }

    // Rule 4: completion declared but work clearly happened; keep going and
    // flag the mismatch.
    if signals.exit_signal {
        return Decision {
            action: Action::Continue,
            reason: "criteria remain unchecked despite a completion marker".to_string(),
            confidence: Confidence::Medium,
            requires_human: false,
            warning: Some("agent declared completion but unchecked criteria remain".to_string()),
        };
    }

    // Rule 5: the agent explicitly asked for help.
    if signals.stuck_signal {
        let reason = if signals.stuck_reason.is_empty() {
            "agent reported being stuck".to_string()
        } else {
            signals.stuck_reason.clone()
        };
        return Decision {
            action: Action::Pause,
            reason,
            confidence: Confidence::High,
            requires_human: true,
            warning: None,
        };
    }

    // Rule 6: circuit breaker.
    if health.tripped {
        return Decision {
            action: Action::Abort,
            reason: health
                .trip_reason
                .clone()
                .unwrap_or_else(|| "health monitor tripped".to_string()),
            confidence: Confidence::High,
            requires_human: false,
            warning: None,
        };
    }

    // Rule 7: resource ceilings.
    if let Some(exceeded) = budget.exceeded {
        return Decision {
            action: Action::Abort,
            reason: exceeded.to_string(),
            confidence: Confidence::High,
            requires_human: false,
            warning: None,
        };
    }

    // Rule 8: soft completion evidence. The heuristic is never trusted
    // outright; it earns a verification stop, not completion.
    if signals.completion_score >= SOFT_COMPLETION_THRESHOLD {
        return Decision {
            action: Action::Verify,
            reason: format!(
                "{} completion phrases without checked criteria; verification needed",
                signals.completion_score
            ),
            confidence: Confidence::Medium,
            requires_human: false,
            warning: None,
        };
    }

    // Rule 9: test-only loop warning.
    if signals.test_only_loop {
        return Decision {
            action: Action::Continue,
            reason: "agent is re-running tests without editing".to_string(),
            confidence: Confidence::Medium,
            requires_human: false,
            warning: Some("test-only loop: tests run but nothing is edited".to_string()),
        };
    }

    // Rule 10: default.
    Decision {
        action: Action::Continue,
        reason: "criteria remain open".to_string(),
        confidence: Confidence::High,
        requires_human: false,
        warning: None,
    }
}

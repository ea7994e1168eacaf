//! Heuristic classification of free-text agent output into typed signals.
//!
//! The agent's response is an untrusted, unstructured channel. This module is
//! the only place that interprets it: one pure pass over the text produces a
//! [`Signals`] value, and everything downstream operates on that value alone.
//! Overlapping heuristics (explicit markers, distress phrases, verb counts)
//! let the decision cascade triangulate intent when markers are missing or
//! wrong.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Literal marker the agent emits to declare the whole task finished.
pub const EXIT_MARKER: &str = "TASK_COMPLETE";

/// Literal marker prefix the agent emits to ask for help.
pub const STUCK_MARKER: &str = "STUCK:";

static CRITERION_DONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CRITERION_DONE:\s*(\d+)").unwrap());

static STEP_DONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"STEP_DONE:\s*(\d+)").unwrap());

static STUCK_REASON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"STUCK:[ \t]*([^\r\n]*)").unwrap());

static EDIT_VERB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(edit\w*|writ(?:e|es|ing|ten)|wrote|creat\w*|modif\w*)\b").unwrap()
});

static BASH_VERB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(ran|run(?:ning|s)?|execut\w*|invok\w*|shell|command)\b").unwrap()
});

static READ_VERB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(read(?:ing|s)?|view\w*|inspect\w*|examin\w*|search\w*|grep\w*)\b").unwrap()
});

static TEST_MENTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(test suite|tests? (?:pass|passed|passing|ran|run|are green)|running (?:the )?tests|cargo test)\b")
        .unwrap()
});

/// Phrases counted toward `completion_score`. Soft evidence only.
const COMPLETION_PHRASES: &[&str] = &[
    "all criteria",
    "task is complete",
    "all tests pass",
    "successfully implemented",
    "finished implementing",
    "implementation is complete",
    "everything is working",
    "nothing left to do",
];

/// Phrases counted toward `error_score`.
const ERROR_PHRASES: &[&str] = &[
    "error:",
    "failed to",
    "cannot",
    "unable to",
    "exception",
    "panicked",
    "fatal",
];

/// First-person distress phrases that count as a stuck signal even without
/// the explicit `STUCK:` marker.
const DISTRESS_PHRASES: &[&str] = &[
    "i'm stuck",
    "need help",
    "blocked by",
    "waiting for human",
    "cannot proceed",
];

/// Lexical counts of action-verb classes in the response.
///
/// Confirmation signal only; the counts say whether the agent *talked about*
/// doing work, not whether work structurally happened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallCounts {
    pub edit: u32,
    pub bash: u32,
    pub read: u32,
    pub total: u32,
}

/// Structured facts extracted from one agent response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signals {
    /// `TASK_COMPLETE` marker present.
    pub exit_signal: bool,
    /// Sorted, deduplicated criterion numbers from `CRITERION_DONE: n`.
    pub criteria_done: Vec<u32>,
    /// Sorted, deduplicated step numbers from `STEP_DONE: n`.
    pub steps_done: Vec<u32>,
    /// `STUCK:` marker or a distress phrase present.
    pub stuck_signal: bool,
    /// Text after `STUCK:` up to the line break; empty otherwise.
    pub stuck_reason: String,
    /// Distinct completion phrases matched.
    pub completion_score: u32,
    /// Distinct error phrases matched.
    pub error_score: u32,
    /// Tests are mentioned but no edit-class verb appears.
    pub test_only_loop: bool,
    pub tool_calls: ToolCallCounts,
}

/// Classify one agent response. Deterministic, no side effects.
pub fn extract(text: &str) -> Signals {
    let lower = text.to_lowercase();

    let stuck_marker = text.contains(STUCK_MARKER);
    let distress = DISTRESS_PHRASES.iter().any(|p| lower.contains(p));
    let stuck_reason = if stuck_marker {
        STUCK_REASON_RE
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default()
    } else {
        String::new()
    };

    let edit = EDIT_VERB_RE.find_iter(text).count() as u32;
    let bash = BASH_VERB_RE.find_iter(text).count() as u32;
    let read = READ_VERB_RE.find_iter(text).count() as u32;

    Signals {
        exit_signal: text.contains(EXIT_MARKER),
        criteria_done: marker_numbers(&CRITERION_DONE_RE, text),
        steps_done: marker_numbers(&STEP_DONE_RE, text),
        stuck_signal: stuck_marker || distress,
        stuck_reason,
        completion_score: distinct_phrase_count(&lower, COMPLETION_PHRASES),
        error_score: distinct_phrase_count(&lower, ERROR_PHRASES),
        test_only_loop: TEST_MENTION_RE.is_match(text) && edit == 0,
        tool_calls: ToolCallCounts {
            edit,
            bash,
            read,
            total: edit + bash + read,
        },
    }
}

/// Collect the integers following every marker occurrence, sorted and
/// deduplicated. Numbers too large for `u32` are ignored.
fn marker_numbers(re: &Regex, text: &str) -> Vec<u32> {
    let set: BTreeSet<u32> = re
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    set.into_iter().collect()
}

fn distinct_phrase_count(lower: &str, phrases: &[&str]) -> u32 {
    phrases.iter().filter(|p| lower.contains(*p)).count() as u32
}

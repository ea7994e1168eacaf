//! Append-only token and iteration ledger.
//!
//! The ledger is a durable, independently auditable log: entries are never
//! mutated after append, and the running cumulative is carried on each entry
//! so a reader can verify the sum without replaying the session.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One ledger row. `cumulative` includes this entry's `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetEntry {
    pub iteration: u32,
    pub input: u64,
    pub output: u64,
    pub total: u64,
    pub cumulative: u64,
}

/// Ordered sequence of per-iteration usage entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BudgetLedger {
    entries: Vec<BudgetEntry>,
}

/// Which ceiling a session ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "ceiling")]
pub enum ExceededCeiling {
    Tokens { used: u64, max: u64 },
    Iterations { used: u32, max: u32 },
}

impl fmt::Display for ExceededCeiling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tokens { used, max } => {
                write!(f, "token budget exhausted: {used} of {max} tokens used")
            }
            Self::Iterations { used, max } => {
                write!(f, "iteration budget exhausted: {used} of {max} iterations used")
            }
        }
    }
}

/// Snapshot of the ledger against the session ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub cumulative_tokens: u64,
    pub iterations_used: u32,
    pub within_budget: bool,
    pub exceeded: Option<ExceededCeiling>,
}

impl BudgetLedger {
    /// Append one iteration's usage. `total = input + output`; the cumulative
    /// extends the previous entry's cumulative (0 for the first entry).
    pub fn append(&mut self, iteration: u32, input: u64, output: u64) {
        let total = input + output;
        let cumulative = self.cumulative_tokens() + total;
        self.entries.push(BudgetEntry {
            iteration,
            input,
            output,
            total,
            cumulative,
        });
    }

    /// Ceiling check. Strict less-than on both axes: reaching a ceiling
    /// counts as exceeded. When both are exceeded, the token ceiling is the
    /// one reported.
    pub fn status(&self, max_tokens: u64, max_iterations: u32) -> BudgetStatus {
        let cumulative_tokens = self.cumulative_tokens();
        let iterations_used = self.entries.len() as u32;

        let exceeded = if cumulative_tokens >= max_tokens {
            Some(ExceededCeiling::Tokens {
                used: cumulative_tokens,
                max: max_tokens,
            })
        } else if iterations_used >= max_iterations {
            Some(ExceededCeiling::Iterations {
                used: iterations_used,
                max: max_iterations,
            })
        } else {
            None
        };

        BudgetStatus {
            cumulative_tokens,
            iterations_used,
            within_budget: exceeded.is_none(),
            exceeded,
        }
    }

    pub fn cumulative_tokens(&self) -> u64 {
        self.entries.last().map_or(0, |entry| entry.cumulative)
    }

    pub fn entries(&self) -> &[BudgetEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

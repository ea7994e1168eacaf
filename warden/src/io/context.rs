//! Per-iteration context rendering for the agent.
//!
//! One template, rendered fresh each iteration from the persisted session
//! record: the checklist with its current check marks, the marker protocol,
//! and steering that escalates while the test suite keeps failing.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::io::state_store::SessionRecord;

const ITERATION_TEMPLATE: &str = include_str!("templates/iteration.md");

/// Checklist entry shape exposed to the template.
#[derive(Debug, Clone, Serialize)]
struct CriterionContext {
    number: u32,
    text: String,
    checked: bool,
}

/// Render the context text fed to the agent for one iteration.
pub fn build_context(record: &SessionRecord, iteration: u32) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("iteration", ITERATION_TEMPLATE)
        .context("iteration template should be valid")?;
    let template = env.get_template("iteration")?;

    let criteria: Vec<CriterionContext> = record
        .criteria
        .items()
        .iter()
        .map(|c| CriterionContext {
            number: c.number,
            text: c.text.clone(),
            checked: c.checked,
        })
        .collect();

    let warning = record
        .last_decision
        .as_ref()
        .and_then(|d| d.warning.clone());

    let rendered = template
        .render(context! {
            iteration => iteration,
            criteria => criteria,
            steering => steering_for(record.health.consecutive_test_failures),
            warning => warning,
            last_error => record.health.last_error.as_deref()
                .filter(|_| record.health.consecutive_errors > 0),
        })
        .context("render iteration context")?;
    Ok(rendered)
}

/// Escalating guidance keyed off the consecutive failing-test streak.
fn steering_for(consecutive_test_failures: u32) -> Option<String> {
    match consecutive_test_failures {
        0 => None,
        1..=2 => Some(
            "The test suite failed on the last run. Fix the failures before anything else."
                .to_string(),
        ),
        n => Some(format!(
            "The test suite has failed {n} consecutive runs. Stop adding functionality; \
             reduce scope until the suite is green, or report STUCK with what is blocking you."
        )),
    }
}

//! Checklist definition loading for `.warden/checklist.json`.
//!
//! The checklist is the human-authored task definition. It is validated
//! against the embedded JSON Schema before parsing so a malformed file is
//! reported with schema-level messages instead of a serde error trail.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use jsonschema::Draft;
use serde_json::Value;

use crate::core::criteria::{Criteria, Criterion};

const CHECKLIST_SCHEMA: &str = include_str!("../../schemas/checklist.schema.json");

/// Load and validate the checklist definition, producing the initial
/// criteria store for a session.
pub fn load_checklist(path: &Path) -> Result<Criteria> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read checklist {}", path.display()))?;
    parse_checklist(&raw).with_context(|| format!("invalid checklist {}", path.display()))
}

/// Parse and validate checklist JSON: schema conformance plus unique numbers.
pub fn parse_checklist(raw: &str) -> Result<Criteria> {
    let instance: Value = serde_json::from_str(raw).context("parse checklist json")?;
    validate_schema(&instance)?;
    let items: Vec<Criterion> = serde_json::from_str(raw).context("parse checklist entries")?;
    Criteria::new(items).map_err(|err| anyhow::anyhow!(err))
}

/// Validate against the embedded schema (Draft 2020-12).
fn validate_schema(instance: &Value) -> Result<()> {
    let schema: Value =
        serde_json::from_str(CHECKLIST_SCHEMA).context("parse embedded checklist schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile checklist schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

/// Serialize a criteria store back into checklist JSON (used by `init` to
/// write the starter template).
pub fn render_checklist(criteria: &Criteria) -> Result<String> {
    let mut buf = serde_json::to_string_pretty(criteria.items())?;
    buf.push('\n');
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_valid_checklist() {
        let raw = r#"[
            {"number": 1, "text": "crate compiles"},
            {"number": 2, "text": "tests pass", "checked": false}
        ]"#;
        let criteria = parse_checklist(raw).expect("parse");
        assert_eq!(criteria.len(), 2);
        assert!(!criteria.all_complete());
    }

    #[test]
    fn rejects_missing_text() {
        let err = parse_checklist(r#"[{"number": 1}]"#).expect_err("schema violation");
        assert!(err.to_string().contains("schema validation failed"));
    }

    #[test]
    fn rejects_unknown_fields() {
        let raw = r#"[{"number": 1, "text": "x", "weight": 3}]"#;
        assert!(parse_checklist(raw).is_err());
    }

    #[test]
    fn rejects_duplicate_numbers() {
        let raw = r#"[
            {"number": 1, "text": "a"},
            {"number": 1, "text": "b"}
        ]"#;
        let err = parse_checklist(raw).expect_err("duplicate numbers");
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn round_trips_through_render() {
        let raw = r#"[{"number": 3, "text": "docs updated", "checked": true}]"#;
        let criteria = parse_checklist(raw).expect("parse");
        let rendered = render_checklist(&criteria).expect("render");
        let reparsed = parse_checklist(&rendered).expect("reparse");
        assert_eq!(reparsed, criteria);
    }
}

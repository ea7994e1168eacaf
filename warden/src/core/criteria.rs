//! Ordered checklist of verifiable completion criteria.
//!
//! Criterion numbers are stable for the life of a session: never reused,
//! never renumbered. Entries only ever flip from unchecked to checked.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One numbered, independently verifiable unit of required work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub number: u32,
    pub text: String,
    #[serde(default)]
    pub checked: bool,
}

/// Ordered set of criteria keyed by stable number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Criteria {
    items: Vec<Criterion>,
}

impl Criteria {
    /// Build a checklist, rejecting duplicate numbers. Order is preserved.
    pub fn new(items: Vec<Criterion>) -> Result<Self, String> {
        let mut seen = HashSet::new();
        for item in &items {
            if !seen.insert(item.number) {
                return Err(format!("duplicate criterion number {}", item.number));
            }
        }
        Ok(Self { items })
    }

    /// Flip the entry with this number from unchecked to checked. Returns
    /// true only when a flip actually happened (the number exists and was
    /// unchecked).
    pub fn mark_checked(&mut self, number: u32) -> bool {
        match self.items.iter_mut().find(|c| c.number == number) {
            Some(criterion) if !criterion.checked => {
                criterion.checked = true;
                true
            }
            _ => false,
        }
    }

    /// True iff this number exists and is not yet checked.
    pub fn is_unchecked(&self, number: u32) -> bool {
        self.items
            .iter()
            .any(|c| c.number == number && !c.checked)
    }

    /// Complete means non-empty with every entry checked. An empty checklist
    /// is never complete; a malformed task definition must not silently
    /// satisfy the loop.
    pub fn all_complete(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|c| c.checked)
    }

    pub fn checked_count(&self) -> usize {
        self.items.iter().filter(|c| c.checked).count()
    }

    pub fn items(&self) -> &[Criterion] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checklist(specs: &[(u32, bool)]) -> Criteria {
        Criteria::new(
            specs
                .iter()
                .map(|(number, checked)| Criterion {
                    number: *number,
                    text: format!("criterion {number}"),
                    checked: *checked,
                })
                .collect(),
        )
        .expect("valid checklist")
    }

    #[test]
    fn empty_checklist_is_never_complete() {
        assert!(!Criteria::default().all_complete());
    }

    #[test]
    fn all_complete_requires_every_entry_checked() {
        let mut criteria = checklist(&[(1, true), (2, false), (3, true)]);
        assert!(!criteria.all_complete());
        assert!(criteria.mark_checked(2));
        assert!(criteria.all_complete());
    }

    #[test]
    fn mark_checked_flips_exactly_once() {
        let mut criteria = checklist(&[(1, false), (2, false)]);
        assert!(criteria.mark_checked(1));
        assert!(!criteria.mark_checked(1));
        assert_eq!(criteria.checked_count(), 1);
    }

    #[test]
    fn mark_checked_ignores_unknown_numbers() {
        let mut criteria = checklist(&[(1, false)]);
        assert!(!criteria.mark_checked(42));
        assert_eq!(criteria.checked_count(), 0);
    }

    #[test]
    fn numbers_are_not_renumbered_by_marking() {
        let mut criteria = checklist(&[(3, false), (1, false), (7, false)]);
        criteria.mark_checked(1);
        let numbers: Vec<u32> = criteria.items().iter().map(|c| c.number).collect();
        assert_eq!(numbers, vec![3, 1, 7]);
    }

    #[test]
    fn duplicate_numbers_are_rejected() {
        let err = Criteria::new(vec![
            Criterion {
                number: 2,
                text: "a".to_string(),
                checked: false,
            },
            Criterion {
                number: 2,
                text: "b".to_string(),
                checked: false,
            },
        ])
        .expect_err("duplicate number");
        assert!(err.contains("duplicate"));
    }

    #[test]
    fn is_unchecked_tracks_state() {
        let mut criteria = checklist(&[(5, false)]);
        assert!(criteria.is_unchecked(5));
        criteria.mark_checked(5);
        assert!(!criteria.is_unchecked(5));
        assert!(!criteria.is_unchecked(6));
    }
}

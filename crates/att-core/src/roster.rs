//! Employee roster reconciliation.
//!
//! Compares the roster observed on the device with the roster already
//! persisted, keyed by card. Names are compared exactly (case-sensitive).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::types::Card;

/// An employee as listed by the access-control device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Employee {
    pub card: Card,
    pub first_name: String,
    pub last_name: String,
}

impl Employee {
    /// Returns whether both name fields match exactly.
    #[must_use]
    pub fn same_name(&self, other: &Self) -> bool {
        self.first_name == other.first_name && self.last_name == other.last_name
    }
}

/// Writes needed to bring the persisted roster up to date.
///
/// `insert`, `update`, `unchanged` and `duplicates` partition the observed
/// roster; no card appears in both `insert` and `update`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterDiff {
    /// Cards not previously known.
    pub insert: Vec<Employee>,
    /// Known cards whose names changed.
    pub update: Vec<Employee>,
    /// Known cards with identical names; nothing to write.
    pub unchanged: Vec<Employee>,
    /// Repeated cards within the observed roster, after the first occurrence.
    pub duplicates: Vec<Employee>,
}

/// Computes inserts and updates for `observed` against `existing`.
pub fn diff_roster(observed: &[Employee], existing: &[Employee]) -> RosterDiff {
    let known: HashMap<&Card, &Employee> = existing
        .iter()
        .map(|employee| (&employee.card, employee))
        .collect();

    let mut diff = RosterDiff::default();
    let mut seen: HashSet<&Card> = HashSet::with_capacity(observed.len());
    for employee in observed {
        if !seen.insert(&employee.card) {
            tracing::warn!(card = %employee.card, "card listed twice in roster");
            diff.duplicates.push(employee.clone());
            continue;
        }
        match known.get(&employee.card) {
            None => diff.insert.push(employee.clone()),
            Some(stored) if stored.same_name(employee) => diff.unchanged.push(employee.clone()),
            Some(_) => diff.update.push(employee.clone()),
        }
    }

    tracing::debug!(
        insert = diff.insert.len(),
        update = diff.update.len(),
        unchanged = diff.unchanged.len(),
        "roster diff computed"
    );
    diff
}

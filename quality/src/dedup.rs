use std::collections::HashSet;

use tracing::debug;

use crate::case::{renumber, TestCase};

/// Outcome of one exact-match dedup pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupOutcome {
    pub cases: Vec<TestCase>,
    pub removed: usize,
}

impl DedupOutcome {
    pub fn summary(&self) -> String {
        if self.removed == 0 {
            "No duplicate cases found".to_string()
        } else {
            format!("Removed {} duplicate cases", self.removed)
        }
    }
}

/// Drop exact `(title, steps, expected_results)` repeats, keeping the first
/// occurrence, then renumber the survivors `001..=M`.
///
/// Idempotent: a second pass over the output removes nothing and leaves
/// every id unchanged.
pub fn dedup_exact(mut cases: Vec<TestCase>) -> DedupOutcome {
    let before = cases.len();
    let mut seen = HashSet::with_capacity(before);
    let first_seen: Vec<bool> = cases
        .iter()
        .map(|case| seen.insert(case.dedup_key()))
        .collect();
    drop(seen);
    let mut flags = first_seen.into_iter();
    cases.retain(|_| flags.next().unwrap_or(false));

    let removed = before - cases.len();
    renumber(&mut cases);
    debug!(before, removed, kept = cases.len(), "exact dedup pass");
    DedupOutcome { cases, removed }
}

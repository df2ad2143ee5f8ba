//! Duplicate detection over whole case sets.
//!
//! Two independent signals are combined into one [`DuplicateReport`]:
//!
//! 1. **Title duplicates**: exact, case-sensitive match of non-empty titles.
//! 2. **Steps near-duplicates**: greedy first-match clustering of the joined
//!    steps text. Each case is compared against group representatives only
//!    (never every member) and attaches to the first group whose similarity
//!    is strictly above [`SIMILARITY_THRESHOLD`], scored with
//!    [`similarity_ratio`].
//!
//! Expected results are clustered the same way, but only surface as the
//! diagnostic `expected_results_group_count`; they never feed
//! `duplicate_count`.
//!
//! `duplicate_count` is title groups plus steps groups, so a pair that
//! matches on both signals counts twice.

use serde::Serialize;
use tracing::debug;

use crate::case::TestCase;
use crate::normalize::CaseRecord;
use crate::similarity::similarity_ratio;

/// Similarity a case must strictly exceed to join a cluster.
pub const SIMILARITY_THRESHOLD: f64 = 0.8;

/// Anything that can be checked for duplication.
pub trait DuplicateCandidate {
    /// Stable identifier, `None` when the source had none.
    fn case_id(&self) -> Option<&str>;
    fn title(&self) -> &str;
    fn steps_text(&self) -> String;
    fn expected_results_text(&self) -> String;
}

impl DuplicateCandidate for TestCase {
    fn case_id(&self) -> Option<&str> {
        non_empty(&self.case_id)
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn steps_text(&self) -> String {
        self.steps.join("\n")
    }

    fn expected_results_text(&self) -> String {
        self.expected_results.join("\n")
    }
}

impl DuplicateCandidate for CaseRecord {
    fn case_id(&self) -> Option<&str> {
        non_empty(&self.case_id)
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn steps_text(&self) -> String {
        self.steps.join("\n")
    }

    fn expected_results_text(&self) -> String {
        self.expected_results.join("\n")
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

/// A title that occurs more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TitleDuplicate {
    pub title: String,
    pub count: usize,
}

/// A cluster of cases with near-identical steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepsDuplicateGroup {
    pub count: usize,
    pub case_ids: Vec<String>,
    pub titles: Vec<String>,
}

/// Duplication diagnostics for one case set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DuplicateReport {
    pub total_cases: usize,
    /// Title groups plus steps groups.
    pub duplicate_count: usize,
    /// Percentage of `total_cases`, rounded to two decimals.
    pub duplicate_rate: f64,
    /// In first-seen order.
    pub title_duplicates: Vec<TitleDuplicate>,
    pub steps_duplicates: Vec<StepsDuplicateGroup>,
    /// Diagnostic only.
    pub expected_results_group_count: usize,
}

impl DuplicateReport {
    pub fn has_duplicates(&self) -> bool {
        self.duplicate_count > 0
    }

    /// Human-readable summary, one entry per line.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Total cases: {}", self.total_cases),
            format!("Duplicate groups: {}", self.duplicate_count),
            format!("Duplicate rate: {:.2}%", self.duplicate_rate),
        ];
        if !self.title_duplicates.is_empty() {
            lines.push("Duplicate titles:".to_string());
            for dup in &self.title_duplicates {
                lines.push(format!("  - \"{}\" x{}", dup.title, dup.count));
            }
        }
        if !self.steps_duplicates.is_empty() {
            lines.push("Similar steps:".to_string());
            for group in &self.steps_duplicates {
                lines.push(format!(
                    "  - {} cases: {}",
                    group.count,
                    group.case_ids.join(", ")
                ));
            }
        }
        lines
    }
}

/// Compute the duplication report for a case set.
pub fn detect<C: DuplicateCandidate>(cases: &[C]) -> DuplicateReport {
    let total = cases.len();
    if total < 2 {
        return DuplicateReport {
            total_cases: total,
            ..DuplicateReport::default()
        };
    }

    let title_duplicates = title_duplicates(cases);
    let steps_groups = cluster(cases, |c| c.steps_text());
    let expected_groups = cluster(cases, |c| c.expected_results_text());

    let steps_duplicates: Vec<StepsDuplicateGroup> = steps_groups
        .into_iter()
        .map(|members| StepsDuplicateGroup {
            count: members.len(),
            case_ids: members
                .iter()
                .map(|&idx| {
                    cases[idx]
                        .case_id()
                        .map(str::to_string)
                        .unwrap_or_else(|| idx.to_string())
                })
                .collect(),
            titles: members
                .iter()
                .map(|&idx| cases[idx].title().to_string())
                .collect(),
        })
        .collect();

    let duplicate_count = title_duplicates.len() + steps_duplicates.len();
    let duplicate_rate = round2(duplicate_count as f64 / total as f64 * 100.0);
    debug!(
        total,
        title_groups = title_duplicates.len(),
        steps_groups = steps_duplicates.len(),
        duplicate_rate,
        "duplicate detection complete"
    );

    DuplicateReport {
        total_cases: total,
        duplicate_count,
        duplicate_rate,
        title_duplicates,
        steps_duplicates,
        expected_results_group_count: expected_groups.len(),
    }
}

fn title_duplicates<C: DuplicateCandidate>(cases: &[C]) -> Vec<TitleDuplicate> {
    let mut seen: Vec<TitleDuplicate> = Vec::new();
    for case in cases {
        let title = case.title();
        if title.is_empty() {
            continue;
        }
        match seen.iter_mut().find(|d| d.title == title) {
            Some(dup) => dup.count += 1,
            None => seen.push(TitleDuplicate {
                title: title.to_string(),
                count: 1,
            }),
        }
    }
    seen.retain(|d| d.count > 1);
    seen
}

/// Greedy first-match clustering. Returns only groups with more than one
/// member, as indices into `cases`.
fn cluster<C, F>(cases: &[C], text_of: F) -> Vec<Vec<usize>>
where
    C: DuplicateCandidate,
    F: Fn(&C) -> String,
{
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for (idx, case) in cases.iter().enumerate() {
        let text = text_of(case);
        if text.is_empty() {
            continue;
        }
        match groups
            .iter_mut()
            .find(|(representative, _)| {
                similarity_ratio(&text, representative) > SIMILARITY_THRESHOLD
            })
        {
            Some((_, members)) => members.push(idx),
            None => groups.push((text, vec![idx])),
        }
    }
    groups
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(_, members)| members)
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

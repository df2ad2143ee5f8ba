//! Test-case data model shared by the generation pipeline and the evaluator.
//!
//! ## Key types
//!
//! | Type             | Produced by                  | Consumed by                   |
//! |------------------|------------------------------|-------------------------------|
//! | `TestCase`       | Case generator (one per point) | Validation, reports, evaluator |
//! | `FailedPoint`    | Generation fan-in            | Callers that re-drive generation |
//! | `CaseCollection` | Generation / validation stages | Artifact sink, evaluator      |

use serde::{Deserialize, Serialize};

/// Width of the zero-padded ordinal used for `case_id`.
pub const CASE_ID_WIDTH: usize = 3;

/// Format a 1-based ordinal as a case id (`7` → `"007"`).
pub fn format_case_id(ordinal: usize) -> String {
    format!("{ordinal:0width$}", width = CASE_ID_WIDTH)
}

/// A single structured test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Zero-padded ordinal, contiguous within one collection.
    pub case_id: String,
    pub title: String,
    /// Free text, may span several lines.
    pub preconditions: String,
    pub steps: Vec<String>,
    /// Paired index-to-index with `steps` by convention only.
    pub expected_results: Vec<String>,
}

impl TestCase {
    /// The exact-match dedup key: `(title, steps, expected_results)`.
    pub fn dedup_key(&self) -> (&str, &[String], &[String]) {
        (&self.title, &self.steps, &self.expected_results)
    }

    pub fn with_case_id(mut self, case_id: impl Into<String>) -> Self {
        self.case_id = case_id.into();
        self
    }
}

/// A requirement point that produced no parseable case after all retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPoint {
    /// Ordinal of the point's position in the original outline.
    pub case_id: String,
    pub requirement: String,
}

/// Ordered case list plus the points that failed to generate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseCollection {
    pub test_suite: String,
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub failed_cases: Vec<FailedPoint>,
}

impl CaseCollection {
    pub fn new(test_suite: impl Into<String>) -> Self {
        Self {
            test_suite: test_suite.into(),
            test_cases: Vec::new(),
            failed_cases: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.test_cases.is_empty()
    }

    pub fn len(&self) -> usize {
        self.test_cases.len()
    }
}

/// Reassign `case_id` as `001..=N` in current order.
pub fn renumber(cases: &mut [TestCase]) {
    for (idx, case) in cases.iter_mut().enumerate() {
        case.case_id = format_case_id(idx + 1);
    }
}

/// `true` when ids are exactly `001..=N` in order.
pub fn ids_are_contiguous(cases: &[TestCase]) -> bool {
    cases
        .iter()
        .enumerate()
        .all(|(idx, case)| case.case_id == format_case_id(idx + 1))
}

//! Markdown rendering for case collections and score reports.

use std::fmt::Write as _;

use case_quality::{CaseCollection, TestCase};
use serde_json::Value;

use crate::evaluator::ScoreReport;
use crate::prompts::DIMENSIONS;

/// Coverage-analysis lists rendered under a dimension, with their headings.
const ANALYSIS_LISTS: [(&str, &str); 3] = [
    ("covered_features", "Covered features"),
    ("missed_features_or_scenarios", "Missed features or scenarios"),
    ("scenario_types_found", "Scenario types found"),
];

fn anchor(case: &TestCase) -> String {
    format!("case-{}", case.case_id.to_lowercase())
}

/// Table of contents followed by one section per case.
pub fn render_collection(collection: &CaseCollection) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# {}\n", collection.test_suite);
    let _ = writeln!(
        md,
        "{} test case(s), {} failed requirement point(s).\n",
        collection.len(),
        collection.failed_cases.len()
    );

    md.push_str("## Contents\n\n");
    for case in &collection.test_cases {
        let _ = writeln!(md, "- [{} {}](#{})", case.case_id, case.title, anchor(case));
    }
    md.push('\n');

    for case in &collection.test_cases {
        let _ = writeln!(md, "<a id=\"{}\"></a>\n", anchor(case));
        let _ = writeln!(md, "## {} {}\n", case.case_id, case.title);
        if !case.preconditions.trim().is_empty() {
            let _ = writeln!(md, "**Preconditions**\n\n{}\n", case.preconditions.trim());
        }
        md.push_str("**Steps**\n\n");
        for step in &case.steps {
            let _ = writeln!(md, "- {step}");
        }
        md.push_str("\n**Expected results**\n\n");
        for expected in &case.expected_results {
            let _ = writeln!(md, "- {expected}");
        }
        md.push('\n');
    }

    if !collection.failed_cases.is_empty() {
        md.push_str("## Failed requirement points\n\n");
        for failed in &collection.failed_cases {
            let _ = writeln!(md, "- {}: {}", failed.case_id, failed.requirement);
        }
        md.push('\n');
    }

    md
}

fn text_of(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "N/A".to_string(),
        Some(other) => other.to_string(),
    }
}

/// Title-case a snake_case key (`test_coverage` → `Test Coverage`).
fn heading_for(key: &str) -> String {
    if let Some((_, label, _)) = DIMENSIONS.iter().find(|(k, _, _)| *k == key) {
        return (*label).to_string();
    }
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Summary, then one section per scored dimension. Raw text reports are
/// returned verbatim.
pub fn render_score_report(report: &ScoreReport) -> String {
    let value = match report {
        ScoreReport::RawText { text } => return text.clone(),
        ScoreReport::Structured(value) => value,
    };

    let mut md = String::from("# Test Case Evaluation Report\n\n");

    if let Some(summary) = value.get("evaluation_summary") {
        md.push_str("## Summary\n\n");
        let _ = writeln!(
            md,
            "**Overall score**: {}\n",
            text_of(summary.get("overall_score"))
        );
        if let Some(weighted) = report.weighted_score() {
            let _ = writeln!(md, "**Weighted score**: {weighted:.2}\n");
        }
        let _ = writeln!(
            md,
            "**Suggestion**: {}\n",
            text_of(summary.get("final_suggestion"))
        );
    }

    if let Some(Value::Object(detailed)) = value.get("detailed_report") {
        md.push_str("## Detailed assessment\n\n");
        for (key, section) in detailed {
            if section.get("score").is_none() {
                continue;
            }
            let _ = writeln!(md, "### {}\n", heading_for(key));
            let _ = writeln!(md, "**Score**: {}\n", text_of(section.get("score")));
            let _ = writeln!(md, "**Reason**: {}\n", text_of(section.get("reason")));

            let Some(analysis) = section.get("analysis") else {
                continue;
            };
            for (list_key, list_heading) in ANALYSIS_LISTS {
                if let Some(Value::Array(items)) = analysis.get(list_key) {
                    let _ = writeln!(md, "**{list_heading}**:\n");
                    for item in items {
                        let _ = writeln!(md, "- {}", text_of(Some(item)));
                    }
                    md.push('\n');
                }
            }
        }
    }

    md
}

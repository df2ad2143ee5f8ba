//! Legacy case-file normalization.
//!
//! Case sets reach the evaluator in several historical JSON layouts: the
//! pipeline's own collection artifact, that artifact wrapped under
//! `testcases`, golden sets grouped by category, or a bare array. Each
//! layout is classified into a [`CaseDocument`] variant first and only then
//! flattened into canonical [`CaseRecord`]s, so an unknown layout is an
//! explicit error instead of a best-effort guess.
//!
//! ```text
//! {"testcases": {"test_cases": [..]}}   → CaseDocument::WrappedCollection
//! {"testcases": [..]}                   → CaseDocument::WrappedList
//! {"test_cases": [..]}                  → CaseDocument::Collection
//! {"test_cases": {"<category>": [..]}}  → CaseDocument::Categorized
//! [..]                                  → CaseDocument::Bare
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::case::{format_case_id, TestCase};
use crate::error::NormalizeError;

/// Canonical case record produced from any recognized input layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub case_id: String,
    pub title: String,
    pub preconditions: String,
    pub steps: Vec<String>,
    pub expected_results: Vec<String>,
    /// Category the case was grouped under, for category-keyed layouts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl From<&TestCase> for CaseRecord {
    fn from(case: &TestCase) -> Self {
        Self {
            case_id: case.case_id.clone(),
            title: case.title.clone(),
            preconditions: case.preconditions.clone(),
            steps: case.steps.clone(),
            expected_results: case.expected_results.clone(),
            category: None,
        }
    }
}

impl From<CaseRecord> for TestCase {
    fn from(record: CaseRecord) -> Self {
        Self {
            case_id: record.case_id,
            title: record.title,
            preconditions: record.preconditions,
            steps: record.steps,
            expected_results: record.expected_results,
        }
    }
}

/// The recognized top-level layouts of a case file.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseDocument {
    WrappedCollection(Vec<Value>),
    WrappedList(Vec<Value>),
    Collection(Vec<Value>),
    Categorized(Vec<(String, Vec<Value>)>),
    Bare(Vec<Value>),
}

impl CaseDocument {
    /// Classify a parsed JSON value into one of the known layouts.
    pub fn classify(value: Value) -> Result<Self, NormalizeError> {
        match value {
            Value::Array(items) => Ok(Self::Bare(items)),
            Value::Object(mut map) => {
                if let Some(inner) = map.remove("testcases") {
                    return match inner {
                        Value::Array(items) => Ok(Self::WrappedList(items)),
                        Value::Object(mut inner_map) => match inner_map.remove("test_cases") {
                            Some(Value::Array(items)) => Ok(Self::WrappedCollection(items)),
                            _ => Err(NormalizeError::UnrecognizedFormat(
                                "`testcases` object without a `test_cases` array".into(),
                            )),
                        },
                        other => Err(NormalizeError::UnrecognizedFormat(format!(
                            "`testcases` is a {}",
                            json_kind(&other)
                        ))),
                    };
                }
                match map.remove("test_cases") {
                    Some(Value::Array(items)) => Ok(Self::Collection(items)),
                    Some(Value::Object(groups)) => {
                        let mut categories = Vec::with_capacity(groups.len());
                        for (category, cases) in groups {
                            match cases {
                                Value::Array(items) => categories.push((category, items)),
                                other => {
                                    return Err(NormalizeError::UnrecognizedFormat(format!(
                                        "category `{category}` holds a {}, expected an array",
                                        json_kind(&other)
                                    )))
                                }
                            }
                        }
                        Ok(Self::Categorized(categories))
                    }
                    Some(other) => Err(NormalizeError::UnrecognizedFormat(format!(
                        "`test_cases` is a {}",
                        json_kind(&other)
                    ))),
                    None => Err(NormalizeError::UnrecognizedFormat(
                        "object has neither `testcases` nor `test_cases`".into(),
                    )),
                }
            }
            other => Err(NormalizeError::UnrecognizedFormat(format!(
                "top-level {}",
                json_kind(&other)
            ))),
        }
    }

    /// Flatten into canonical records, preserving document order.
    pub fn into_records(self) -> Result<Vec<CaseRecord>, NormalizeError> {
        let tagged: Vec<(Option<String>, Value)> = match self {
            Self::WrappedCollection(items)
            | Self::WrappedList(items)
            | Self::Collection(items)
            | Self::Bare(items) => items.into_iter().map(|v| (None, v)).collect(),
            Self::Categorized(groups) => groups
                .into_iter()
                .flat_map(|(category, items)| {
                    items.into_iter().map(move |v| (Some(category.clone()), v))
                })
                .collect(),
        };

        tagged
            .into_iter()
            .enumerate()
            .map(|(index, (category, value))| record_from_value(index, category, value))
            .collect()
    }
}

/// Parse and normalize a case file in any recognized layout.
pub fn normalize_case_document(raw: &str) -> Result<Vec<CaseRecord>, NormalizeError> {
    let value: Value = serde_json::from_str(raw)?;
    CaseDocument::classify(value)?.into_records()
}

// ── Per-case parsing ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextOrList {
    Text(String),
    List(Vec<String>),
}

impl TextOrList {
    fn into_lines(self) -> Vec<String> {
        match self {
            Self::Text(text) => text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            Self::List(items) => items,
        }
    }

    fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::List(items) => items.join("\n"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CaseIdValue {
    Text(String),
    Number(u64),
}

#[derive(Debug, Deserialize)]
struct RawCase {
    #[serde(default, alias = "id")]
    case_id: Option<CaseIdValue>,
    #[serde(default, alias = "标题")]
    title: Option<String>,
    #[serde(default, alias = "precondition", alias = "前置条件")]
    preconditions: Option<TextOrList>,
    #[serde(default, alias = "测试步骤")]
    steps: Option<TextOrList>,
    #[serde(default, alias = "预期结果")]
    expected_results: Option<TextOrList>,
}

fn record_from_value(
    index: usize,
    category: Option<String>,
    value: Value,
) -> Result<CaseRecord, NormalizeError> {
    if !value.is_object() {
        return Err(NormalizeError::InvalidCase {
            index,
            reason: format!("expected an object, found a {}", json_kind(&value)),
        });
    }
    let raw: RawCase = serde_json::from_value(value).map_err(|e| NormalizeError::InvalidCase {
        index,
        reason: e.to_string(),
    })?;

    let case_id = match raw.case_id {
        Some(CaseIdValue::Text(id)) if !id.trim().is_empty() => id,
        Some(CaseIdValue::Number(n)) => format_case_id(n as usize),
        _ => format!("TC-{}", format_case_id(index + 1)),
    };

    Ok(CaseRecord {
        case_id,
        title: raw.title.unwrap_or_default(),
        preconditions: raw.preconditions.map(TextOrList::into_text).unwrap_or_default(),
        steps: raw.steps.map(TextOrList::into_lines).unwrap_or_default(),
        expected_results: raw
            .expected_results
            .map(TextOrList::into_lines)
            .unwrap_or_default(),
        category,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

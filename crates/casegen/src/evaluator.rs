//! Golden-set evaluation: one logical model call comparing two case sets.
//!
//! Both sets go through the duplicate detector first; the summaries are
//! logged and embedded in the prompt so the model can weigh redundancy.
//! The response is kept structured when it parses as JSON and verbatim
//! otherwise; only a run where every attempt failed to reach the model
//! yields no report.

use std::sync::Arc;
use std::time::Duration;

use case_quality::{detect, CaseRecord, DuplicateReport};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::EvaluationConfig;
use crate::context::RunContext;
use crate::invoker::{ModelInvoker, PromptPayload};
use crate::prompts::{self, DIMENSIONS};

/// What the evaluator got back from the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScoreReport {
    Structured(Value),
    /// The response was not JSON; kept verbatim.
    RawText { text: String },
}

impl ScoreReport {
    fn from_response(raw: &str) -> Self {
        let body = fenced_body(raw);
        match serde_json::from_str::<Value>(body) {
            Ok(value) => Self::Structured(value),
            Err(_) => Self::RawText {
                text: body.to_string(),
            },
        }
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            Self::Structured(value) => Some(value),
            Self::RawText { .. } => None,
        }
    }

    /// Score for one dimension of `detailed_report`, as a number.
    pub fn dimension_score(&self, key: &str) -> Option<f64> {
        self.as_structured()?
            .get("detailed_report")?
            .get(key)?
            .get("score")
            .and_then(numeric)
    }

    /// The model-reported `evaluation_summary.overall_score`.
    pub fn overall_score(&self) -> Option<f64> {
        self.as_structured()?
            .get("evaluation_summary")?
            .get("overall_score")
            .and_then(numeric)
    }

    /// Overall score recomputed from the five weighted dimensions. `None`
    /// unless every dimension carries a numeric score.
    pub fn weighted_score(&self) -> Option<f64> {
        DIMENSIONS
            .iter()
            .map(|(key, _, weight)| self.dimension_score(key).map(|score| score * weight))
            .sum::<Option<f64>>()
            .map(|total| (total * 100.0).round() / 100.0)
    }
}

/// Content of the first ```` ```json ```` block, else of the first bare
/// fence, else the trimmed text.
fn fenced_body(raw: &str) -> &str {
    let (open, marker_len) = match raw.find("```json") {
        Some(idx) => (idx, "```json".len()),
        None => match raw.find("```") {
            Some(idx) => (idx, "```".len()),
            None => return raw.trim(),
        },
    };
    let rest = &raw[open + marker_len..];
    let end = rest.find("```").unwrap_or(rest.len());
    rest[..end].trim()
}

/// Accepts `4.5` as well as `"4.5"`.
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Duplicate diagnostics for both sides of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateComparison {
    pub ai: DuplicateReport,
    pub golden: DuplicateReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluatorSettings {
    pub max_attempts: u32,
    /// Attempt `n` is followed by a wait of `n * backoff`.
    pub backoff: Duration,
}

impl From<&EvaluationConfig> for EvaluatorSettings {
    fn from(config: &EvaluationConfig) -> Self {
        Self {
            max_attempts: config.max_retries,
            backoff: config.backoff(),
        }
    }
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self::from(&EvaluationConfig::default())
    }
}

pub struct Evaluator {
    invoker: Arc<dyn ModelInvoker>,
    settings: EvaluatorSettings,
}

impl Evaluator {
    pub fn new(invoker: Arc<dyn ModelInvoker>, settings: EvaluatorSettings) -> Self {
        Self { invoker, settings }
    }

    pub fn compare_duplicates(ai: &[CaseRecord], golden: &[CaseRecord]) -> DuplicateComparison {
        DuplicateComparison {
            ai: detect(ai),
            golden: detect(golden),
        }
    }

    /// Compare `ai` against `golden`. Returns `None` only when every attempt
    /// failed to reach the model.
    pub async fn evaluate(
        &self,
        ctx: &RunContext,
        ai: &[CaseRecord],
        golden: &[CaseRecord],
    ) -> Option<ScoreReport> {
        let duplicates = Self::compare_duplicates(ai, golden);
        info!(
            run_id = %ctx.run_id,
            ai_cases = ai.len(),
            golden_cases = golden.len(),
            ai_duplicate_rate = duplicates.ai.duplicate_rate,
            golden_duplicate_rate = duplicates.golden.duplicate_rate,
            "duplicate analysis complete"
        );

        let ai_json = serde_json::to_string_pretty(ai).unwrap_or_default();
        let golden_json = serde_json::to_string_pretty(golden).unwrap_or_default();
        let prompt = prompts::evaluation_prompt(
            &ai_json,
            &golden_json,
            &duplicates.ai.summary_lines(),
            &duplicates.golden.summary_lines(),
        );
        let payload = PromptPayload::text(prompt).with_system(prompts::EVALUATOR_SYSTEM);

        let max_attempts = self.settings.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.invoker.invoke(&payload).await {
                Ok(raw) => {
                    let report = ScoreReport::from_response(&raw);
                    match &report {
                        ScoreReport::Structured(_) => info!(
                            run_id = %ctx.run_id,
                            elapsed_s = ctx.elapsed_s(),
                            attempt,
                            overall = ?report.overall_score(),
                            weighted = ?report.weighted_score(),
                            "evaluation complete"
                        ),
                        ScoreReport::RawText { .. } => warn!(
                            run_id = %ctx.run_id,
                            attempt,
                            "evaluation response is not JSON, keeping raw text"
                        ),
                    }
                    return Some(report);
                }
                Err(e) => {
                    warn!(
                        run_id = %ctx.run_id,
                        attempt,
                        max_attempts,
                        error = %e,
                        "evaluation call failed"
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(self.settings.backoff * attempt).await;
                    }
                }
            }
        }
        None
    }
}

//! Per-requirement case generation with bounded retries and a shared
//! concurrency gate.
//!
//! ```text
//! outline ──split──► points[0..N]
//!                      │
//!                      ▼  JoinSet::spawn × N, one gate shared by all tasks
//!             ┌─ acquire permit ─ invoke ─ release ─ parse ─┐
//!             │         ▲                                   │ failure
//!             │         └────────── sleep(delay) ◄──────────┤ (attempt < max)
//!             ▼                                             ▼
//!          TestCase                                 GenerationFailure
//!                      │
//!                      ▼  fan-in, original order restored
//!            successes → ids 001..K      failures → FailedPoint(original ordinal)
//! ```
//!
//! A panicking task is recorded as a failure of its point; the rest of the
//! batch is unaffected.

use std::sync::Arc;
use std::time::Duration;

use case_quality::{format_case_id, renumber, FailedPoint, TestCase};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn, Instrument, Span};

use crate::config::GenerationConfig;
use crate::errors::{GenerationError, GenerationFailure};
use crate::invoker::{ModelInvoker, PromptPayload};
use crate::prompts;

/// Minimum trimmed length of an outline line that counts as a point.
const MIN_POINT_CHARS: usize = 5;

// ── ConcurrencyGate ──────────────────────────────────────────────────────────

/// Shared bound on in-flight model calls.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a permit. The permit is returned to the gate when dropped.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, GenerationError> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GenerationError::GateClosed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

// ── Response parsing ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Precondition {
    Text(String),
    Lines(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct GeneratedCase {
    title: String,
    #[serde(default, alias = "preconditions")]
    precondition: Option<Precondition>,
    steps: Vec<String>,
    expected_results: Vec<String>,
}

/// Remove a surrounding markdown code fence, if any.
pub(crate) fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `JSON`, ...) on the opening line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Parse one model response into a test case (without a `case_id`).
///
/// Accepts a single object or an array whose first element is used.
pub fn parse_case_response(raw: &str) -> Result<TestCase, GenerationError> {
    let body = strip_code_fence(raw);
    let value: Value = serde_json::from_str(body)
        .map_err(|e| GenerationError::parse(format!("response is not JSON: {e}")))?;

    let object = match value {
        Value::Array(items) => items
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::parse("response is an empty array"))?,
        other => other,
    };
    if !object.is_object() {
        return Err(GenerationError::parse("response is not a JSON object"));
    }

    let case: GeneratedCase = serde_json::from_value(object)
        .map_err(|e| GenerationError::parse(format!("unexpected case shape: {e}")))?;

    let preconditions = match case.precondition {
        Some(Precondition::Text(text)) => text,
        Some(Precondition::Lines(lines)) => lines.join("\n"),
        None => String::new(),
    };

    Ok(TestCase {
        case_id: String::new(),
        title: case.title,
        preconditions,
        steps: case.steps,
        expected_results: case.expected_results,
    })
}

/// Split an optimized outline into requirement points.
///
/// Lines of 4 characters or fewer are skipped, list markers (`-`, `•`,
/// spaces, digits, `.`) are stripped from both ends, and points left empty
/// after stripping are dropped.
pub fn split_requirement_points(outline: &str) -> Vec<String> {
    outline
        .lines()
        .map(str::trim)
        .filter(|line| line.chars().count() >= MIN_POINT_CHARS)
        .map(|line| {
            line.trim_matches(|c: char| matches!(c, '-' | '•' | ' ' | '.') || c.is_ascii_digit())
                .trim()
                .to_string()
        })
        .filter(|point| !point.is_empty())
        .collect()
}

// ── CaseGenerator ────────────────────────────────────────────────────────────

/// Retry policy for one requirement point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Fixed wait between attempts; no permit is held while waiting.
    pub delay: Duration,
}

impl From<&GenerationConfig> for RetryPolicy {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            max_attempts: config.max_retries,
            delay: config.retry_delay(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&GenerationConfig::default())
    }
}

/// Result of one fan-out/fan-in batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationBatch {
    /// Successes in original point order, ids `001..=K`.
    pub cases: Vec<TestCase>,
    /// Failures in original point order, ids are original positions.
    pub failed: Vec<FailedPoint>,
}

/// Turns requirement points into test cases.
#[derive(Clone)]
pub struct CaseGenerator {
    invoker: Arc<dyn ModelInvoker>,
    policy: RetryPolicy,
}

impl CaseGenerator {
    pub fn new(invoker: Arc<dyn ModelInvoker>, policy: RetryPolicy) -> Self {
        Self { invoker, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Generate one case for `point`, retrying up to the policy's budget.
    ///
    /// `ordinal` is the point's 1-based position; it becomes the case id on
    /// success and is carried by the failure otherwise.
    pub async fn generate(
        &self,
        point: &str,
        ordinal: usize,
        gate: &ConcurrencyGate,
    ) -> Result<TestCase, GenerationFailure> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(point, gate).await {
                Ok(case) => {
                    debug!(ordinal, attempt, title = %case.title, "case generated");
                    return Ok(case.with_case_id(format_case_id(ordinal)));
                }
                Err(error) if attempt >= max_attempts || !error.is_retriable() => {
                    warn!(ordinal, attempt, error = %error, "giving up on requirement point");
                    return Err(GenerationFailure {
                        ordinal,
                        attempts: attempt,
                        last: error,
                    });
                }
                Err(error) => {
                    warn!(
                        ordinal,
                        attempt,
                        max_attempts,
                        category = %error.retry_category(),
                        error = %error,
                        "generation attempt failed, retrying"
                    );
                    tokio::time::sleep(self.policy.delay).await;
                }
            }
        }
    }

    async fn attempt(&self, point: &str, gate: &ConcurrencyGate) -> Result<TestCase, GenerationError> {
        let payload =
            PromptPayload::text(prompts::case_prompt(point)).with_system(prompts::QA_ENGINEER_SYSTEM);
        let raw = {
            let _permit = gate.acquire().await?;
            self.invoker.invoke(&payload).await?
        };
        parse_case_response(&raw)
    }

    /// Fan out one task per point, wait for all, and fan back in.
    pub async fn generate_batch(&self, points: &[String], gate: &ConcurrencyGate) -> GenerationBatch {
        let mut join_set: JoinSet<(usize, Result<TestCase, GenerationFailure>)> = JoinSet::new();

        for (index, point) in points.iter().enumerate() {
            let generator = self.clone();
            let gate = gate.clone();
            let point = point.clone();
            join_set.spawn(
                async move {
                    let result = generator.generate(&point, index + 1, &gate).await;
                    (index, result)
                }
                .instrument(Span::current()),
            );
        }

        let mut slots: Vec<Option<Result<TestCase, GenerationFailure>>> =
            (0..points.len()).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => {
                    // The slot stays empty and is reported as a failed point below.
                    warn!(error = %e, "generation task panicked");
                }
            }
        }

        let mut batch = GenerationBatch::default();
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(Ok(case)) => batch.cases.push(case),
                Some(Err(_)) | None => batch.failed.push(FailedPoint {
                    case_id: format_case_id(index + 1),
                    requirement: points[index].clone(),
                }),
            }
        }
        renumber(&mut batch.cases);

        info!(
            points = points.len(),
            generated = batch.cases.len(),
            failed = batch.failed.len(),
            "case generation batch complete"
        );
        batch
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::errors::InvocationFailure;
    use crate::invoker::MockModelInvoker;

    const VALID_CASE: &str = r#"{"title":"login ok","precondition":"user exists","steps":["1. open","2. submit"],"expected_results":["1. form shown","2. logged in"]}"#;

    #[test]
    fn split_strips_list_markers_and_skips_short_lines() {
        let outline = "1. User can log in\n\n- ab\n• Password reset by email\n  2.3 Session expires after 30 minutes.  \n----";
        let points = split_requirement_points(outline);
        assert_eq!(
            points,
            vec![
                "User can log in",
                "Password reset by email",
                "Session expires after 30 minutes",
            ]
        );
    }

    #[test]
    fn parse_accepts_fenced_object() {
        let raw = format!("```json\n{VALID_CASE}\n```");
        let case = parse_case_response(&raw).unwrap();
        assert_eq!(case.title, "login ok");
        assert_eq!(case.preconditions, "user exists");
        assert_eq!(case.steps.len(), 2);
    }

    #[test]
    fn parse_takes_first_element_of_array() {
        let raw = format!("[{VALID_CASE}, {{\"title\":\"second\",\"steps\":[],\"expected_results\":[]}}]");
        assert_eq!(parse_case_response(&raw).unwrap().title, "login ok");
    }

    #[test]
    fn parse_accepts_preconditions_alias_and_list() {
        let raw = r#"{"title":"t","preconditions":["a","b"],"steps":["s"],"expected_results":["r"]}"#;
        assert_eq!(parse_case_response(raw).unwrap().preconditions, "a\nb");
    }

    #[test]
    fn parse_rejects_prose_empty_arrays_and_missing_fields() {
        for raw in [
            "Here is your case: {\"title\":\"t\"}",
            "[]",
            r#"{"title":"t","steps":["s"]}"#,
            r#"{"title":"t","steps":"not a list","expected_results":[]}"#,
            "42",
        ] {
            assert!(
                matches!(parse_case_response(raw), Err(GenerationError::ParseFailure(_))),
                "{raw} should fail to parse"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_after_parse_failure_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut mock = MockModelInvoker::new();
        mock.expect_invoke().times(2).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok("not json".to_string())
            } else {
                Ok(VALID_CASE.to_string())
            }
        });

        let generator = CaseGenerator::new(Arc::new(mock), RetryPolicy::default());
        let gate = ConcurrencyGate::new(1);
        let case = generator.generate("User can log in", 4, &gate).await.unwrap();
        assert_eq!(case.case_id, "004");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_reports_ordinal_and_attempts() {
        let mut mock = MockModelInvoker::new();
        mock.expect_invoke()
            .times(3)
            .returning(|_| Err(InvocationFailure::Transport("refused".into())));

        let policy = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1_000),
        };
        let generator = CaseGenerator::new(Arc::new(mock), policy);
        let gate = ConcurrencyGate::new(2);
        let failure = generator.generate("point", 7, &gate).await.unwrap_err();
        assert_eq!(failure.ordinal, 7);
        assert_eq!(failure.attempts, 3);
        assert!(matches!(
            failure.last,
            GenerationError::Invocation(InvocationFailure::Transport(_))
        ));
        assert_eq!(gate.available(), 2);
    }
}

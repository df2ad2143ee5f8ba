//! End-to-end pipeline behavior against scripted in-process invokers.
//!
//! No network: every model call is answered by a closure that dispatches on
//! the prompt text.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use case_quality::{ids_are_contiguous, CaseRecord};
use casegen::{
    CaseGenerator, ConcurrencyGate, Evaluator, EvaluatorSettings, InvocationFailure,
    ModelInvoker, Pipeline, PipelineError, PipelineSettings, PipelineState, PromptPayload,
    RetryPolicy, RunContext, ScoreReport, Stage,
};

type Reply = Result<String, InvocationFailure>;

/// Invoker answering through a closure, counting calls.
struct FnInvoker<F> {
    reply: F,
    calls: AtomicUsize,
}

impl<F> FnInvoker<F>
where
    F: Fn(&PromptPayload) -> Reply + Send + Sync,
{
    fn new(reply: F) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<F> ModelInvoker for FnInvoker<F>
where
    F: Fn(&PromptPayload) -> Reply + Send + Sync,
{
    async fn invoke(&self, payload: &PromptPayload) -> Reply {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.reply)(payload)
    }
}

const SOURCE: &str = "# Account login\n\nUsers log in with email and password.\nAfter five failures the account is locked.";

fn requirement_point(payload: &PromptPayload) -> Option<&str> {
    payload
        .prompt
        .rsplit_once("Requirement point: ")
        .map(|(_, point)| point.trim())
}

fn case_json(title: &str) -> String {
    serde_json::json!({
        "title": title,
        "precondition": "account exists",
        "steps": ["1. open login page", "2. submit credentials"],
        "expected_results": ["1. page shown", "2. outcome displayed"]
    })
    .to_string()
}

/// Extraction and optimization both yield `outline`; cases come from `case`.
fn scripted<C>(outline: &'static str, case: C) -> impl Fn(&PromptPayload) -> Reply + Send + Sync
where
    C: Fn(&str) -> Reply + Send + Sync,
{
    move |payload: &PromptPayload| match requirement_point(payload) {
        Some(point) => case(point),
        None => Ok(outline.to_string()),
    }
}

fn settings(max_concurrent: usize, max_attempts: u32) -> PipelineSettings {
    PipelineSettings {
        max_concurrent,
        retry: RetryPolicy {
            max_attempts,
            delay: Duration::from_millis(1_000),
        },
        ..PipelineSettings::default()
    }
}

#[tokio::test(start_paused = true)]
async fn two_distinct_points_yield_contiguous_ids_and_no_duplicates() {
    let outline = "1. User logs in with valid credentials\n2. Account locks after five failures";
    let invoker = FnInvoker::new(scripted(outline, |point| Ok(case_json(point))));
    let pipeline = Pipeline::new(invoker.clone(), settings(10, 2));
    let ctx = RunContext::new("login.md", "stub");

    let report = pipeline.run(&ctx, SOURCE).await.unwrap();

    assert_eq!(report.title, "Account login");
    assert_eq!(report.collection.test_suite, "Account login");
    let ids: Vec<_> = report.collection.test_cases.iter().map(|c| c.case_id.as_str()).collect();
    assert_eq!(ids, ["001", "002"]);
    assert_eq!(
        report.collection.test_cases[1].title,
        "Account locks after five failures"
    );
    assert_eq!(report.dedup_summary, "No duplicate cases found");
    assert!(report.collection.failed_cases.is_empty());

    let path: Vec<Stage> = report.transitions.iter().map(|t| t.to).collect();
    assert_eq!(
        path,
        [
            Stage::RequirementExtraction,
            Stage::RequirementOptimization,
            Stage::CaseGeneration,
            Stage::Validation,
            Stage::Completed,
        ]
    );
    // extraction + optimization + one call per point; the title came from the heading
    assert_eq!(invoker.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn identical_cases_collapse_to_one() {
    let outline = "1. User logs in with valid credentials\n2. User logs in again later";
    let invoker = FnInvoker::new(scripted(outline, |_| Ok(case_json("login works"))));
    let pipeline = Pipeline::new(invoker, settings(10, 2));
    let ctx = RunContext::new("login.md", "stub");

    let report = pipeline.run(&ctx, SOURCE).await.unwrap();

    assert_eq!(report.collection.len(), 1);
    assert_eq!(report.collection.test_cases[0].case_id, "001");
    assert_eq!(report.dedup_summary, "Removed 1 duplicate cases");
}

#[tokio::test(start_paused = true)]
async fn failed_point_keeps_original_ordinal_and_survives_validation() {
    let outline = "1. First requirement point\n2. Second requirement point\n3. Third requirement point";
    let invoker = FnInvoker::new(scripted(outline, |point| {
        if point.starts_with("Second") {
            Ok("I cannot answer that.".to_string())
        } else {
            Ok(case_json(point))
        }
    }));
    let pipeline = Pipeline::new(invoker.clone(), settings(10, 2));
    let ctx = RunContext::new("r.md", "stub");

    let report = pipeline.run(&ctx, SOURCE).await.unwrap();

    assert_eq!(report.collection.len(), 2);
    assert!(ids_are_contiguous(&report.collection.test_cases));
    assert_eq!(report.collection.failed_cases.len(), 1);
    assert_eq!(report.collection.failed_cases[0].case_id, "002");
    assert_eq!(
        report.collection.failed_cases[0].requirement,
        "Second requirement point"
    );
    // 2 outline calls + 1 + 2 (retried) + 1
    assert_eq!(invoker.calls(), 6);
}

#[tokio::test(start_paused = true)]
async fn always_failing_invoker_uses_exactly_the_retry_budget() {
    let invoker = FnInvoker::new(|_: &PromptPayload| {
        Err(InvocationFailure::Status {
            status: 503,
            body: "overloaded".into(),
        })
    });
    let policy = RetryPolicy {
        max_attempts: 4,
        delay: Duration::from_millis(1_000),
    };
    let generator = CaseGenerator::new(invoker.clone(), policy);
    let gate = ConcurrencyGate::new(3);

    let failure = generator.generate("Export report as CSV", 9, &gate).await.unwrap_err();

    assert_eq!(invoker.calls(), 4);
    assert_eq!(failure.attempts, 4);
    assert_eq!(failure.ordinal, 9);
    assert_eq!(gate.available(), 3);
}

#[tokio::test(start_paused = true)]
async fn gate_bounds_concurrent_model_calls() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    struct SlowInvoker {
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ModelInvoker for SlowInvoker {
        async fn invoke(&self, payload: &PromptPayload) -> Reply {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(case_json(requirement_point(payload).unwrap_or("x")))
        }
    }

    let invoker = Arc::new(SlowInvoker {
        in_flight: in_flight.clone(),
        peak: peak.clone(),
    });
    let generator = CaseGenerator::new(invoker, RetryPolicy::default());
    let gate = ConcurrencyGate::new(2);
    let points: Vec<String> = (1..=10).map(|i| format!("Requirement number {i}")).collect();

    let batch = generator.generate_batch(&points, &gate).await;

    assert_eq!(batch.cases.len(), 10);
    assert!(batch.failed.is_empty());
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    assert_eq!(gate.available(), 2);
    // original order is restored regardless of completion order
    assert_eq!(batch.cases[9].title, "Requirement number 10");
    assert_eq!(batch.cases[9].case_id, "010");
}

#[tokio::test(start_paused = true)]
async fn panicking_task_is_recorded_as_failed_point() {
    let invoker = FnInvoker::new(|payload: &PromptPayload| match requirement_point(payload) {
        Some(point) if point.contains("explode") => panic!("stub invoker exploded"),
        Some(point) => Ok(case_json(point)),
        None => Ok(String::new()),
    });
    let generator = CaseGenerator::new(invoker, RetryPolicy::default());
    let gate = ConcurrencyGate::new(2);
    let points = vec![
        "Normal requirement A".to_string(),
        "This one will explode".to_string(),
        "Normal requirement C".to_string(),
    ];

    let batch = generator.generate_batch(&points, &gate).await;

    assert_eq!(batch.cases.len(), 2);
    assert_eq!(batch.cases[1].title, "Normal requirement C");
    assert_eq!(batch.cases[1].case_id, "002");
    assert_eq!(batch.failed.len(), 1);
    assert_eq!(batch.failed[0].case_id, "002");
    assert_eq!(gate.available(), 2);
}

#[tokio::test(start_paused = true)]
async fn outline_without_points_is_fatal() {
    let invoker = FnInvoker::new(scripted("ok\n-\n12", |point| Ok(case_json(point))));
    let pipeline = Pipeline::new(invoker, settings(10, 2));
    let ctx = RunContext::new("r.md", "stub");

    let err = pipeline.run(&ctx, SOURCE).await.unwrap_err();

    assert!(matches!(err, PipelineError::NoRequirementPoints));
    assert_eq!(err.stage(), Stage::CaseGeneration);
}

#[tokio::test(start_paused = true)]
async fn optimization_failure_names_the_stage() {
    let calls = AtomicUsize::new(0);
    let invoker = FnInvoker::new(move |_: &PromptPayload| {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok("1. some requirement".to_string())
        } else {
            Err(InvocationFailure::Transport("reset by peer".into()))
        }
    });
    let pipeline = Pipeline::new(invoker, settings(10, 2));
    let ctx = RunContext::new("r.md", "stub");

    let err = pipeline.run(&ctx, SOURCE).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Stage {
            stage: Stage::RequirementOptimization,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn validation_is_idempotent() {
    let outline = "1. Alpha requirement\n2. Beta requirement\n3. Alpha requirement again";
    let invoker = FnInvoker::new(scripted(outline, |point| {
        Ok(case_json(point.trim_end_matches(" again")))
    }));
    let pipeline = Pipeline::new(invoker, settings(10, 2));
    let ctx = RunContext::new("r.md", "stub");

    let state = PipelineState {
        title: Some("Suite".into()),
        requirement_outline: Some(outline.into()),
        ..PipelineState::new(SOURCE)
    };
    let generated = pipeline.generate_cases(&ctx, state).await.unwrap();
    assert_eq!(generated.case_collection.len(), 3);

    let once = pipeline.validate(&ctx, generated);
    assert_eq!(once.dedup_summary.as_deref(), Some("Removed 1 duplicate cases"));
    assert!(ids_are_contiguous(&once.case_collection.test_cases));

    let twice = pipeline.validate(&ctx, once.clone());
    assert_eq!(twice.case_collection, once.case_collection);
    assert_eq!(twice.dedup_summary.as_deref(), Some("No duplicate cases found"));
}

fn record(title: &str) -> CaseRecord {
    CaseRecord {
        case_id: String::new(),
        title: title.into(),
        preconditions: String::new(),
        steps: vec![format!("do {title}")],
        expected_results: vec!["ok".into()],
        category: None,
    }
}

#[tokio::test(start_paused = true)]
async fn evaluator_returns_none_only_after_every_attempt_fails() {
    let invoker = FnInvoker::new(|_: &PromptPayload| {
        Err(InvocationFailure::Transport("timeout".into()))
    });
    let evaluator = Evaluator::new(invoker.clone(), EvaluatorSettings::default());
    let ctx = RunContext::new("eval", "stub");

    let result = evaluator
        .evaluate(&ctx, &[record("a")], &[record("b")])
        .await;

    assert!(result.is_none());
    assert_eq!(invoker.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn evaluator_recovers_on_a_later_attempt_and_keeps_prose() {
    let calls = AtomicUsize::new(0);
    let invoker = FnInvoker::new(move |payload: &PromptPayload| {
        assert!(payload.prompt.contains("\"title\": \"golden one\""));
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(InvocationFailure::Transport("timeout".into()))
        } else {
            Ok("Overall the AI cases look reasonable.".to_string())
        }
    });
    let evaluator = Evaluator::new(invoker.clone(), EvaluatorSettings::default());
    let ctx = RunContext::new("eval", "stub");

    let result = evaluator
        .evaluate(&ctx, &[record("ai one")], &[record("golden one")])
        .await;

    assert_eq!(
        result,
        Some(ScoreReport::RawText {
            text: "Overall the AI cases look reasonable.".into()
        })
    );
    assert_eq!(invoker.calls(), 2);
}

//! The five-stage generation pipeline.
//!
//! ```text
//! source text
//!   │ TitleExtraction          heading or one model call, never fatal
//!   │ RequirementExtraction    one model call, fatal on failure
//!   │ RequirementOptimization  one model call, fatal on failure
//!   │ CaseGeneration           fan-out per requirement point
//!   │ Validation               exact dedup + renumber
//!   ▼
//! PipelineReport
//! ```
//!
//! Each stage takes a [`PipelineState`] by value and returns the next one;
//! no stage mutates state shared with another.

use std::sync::{Arc, LazyLock};

use case_quality::{dedup_exact, CaseCollection};
use regex::Regex;
use serde::Serialize;
use tracing::{error, info, warn, Instrument};

use crate::config::{CasegenConfig, TitleConfig};
use crate::context::RunContext;
use crate::errors::PipelineError;
use crate::generator::{split_requirement_points, CaseGenerator, ConcurrencyGate, RetryPolicy};
use crate::invoker::{ModelInvoker, PromptPayload};
use crate::prompts;
use crate::state_machine::{Stage, StageMachine, StageTransition};

/// The first document line shorter than this is used as the title without a model call.
const MAX_HEADING_TITLE_CHARS: usize = 50;

static HEADING_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#+\s*").expect("HEADING_MARKER regex should compile"));

fn strip_heading(line: &str) -> String {
    HEADING_MARKER.replace(line.trim(), "").trim().to_string()
}

/// Working state threaded through the stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineState {
    pub source_text: String,
    pub title: Option<String>,
    pub requirement_outline: Option<String>,
    pub case_collection: CaseCollection,
    pub dedup_summary: Option<String>,
}

impl PipelineState {
    pub fn new(source_text: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            ..Self::default()
        }
    }

    fn title_or_empty(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }

    fn outline_or_empty(&self) -> &str {
        self.requirement_outline.as_deref().unwrap_or_default()
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub title: String,
    pub collection: CaseCollection,
    pub dedup_summary: String,
    pub transitions: Vec<StageTransition>,
    pub elapsed_ms: u64,
}

/// Tunables for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub title: TitleConfig,
    pub retry: RetryPolicy,
    pub max_concurrent: usize,
}

impl From<&CasegenConfig> for PipelineSettings {
    fn from(config: &CasegenConfig) -> Self {
        Self {
            title: config.title.clone(),
            retry: RetryPolicy::from(&config.generation),
            max_concurrent: config.generation.max_concurrent,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&CasegenConfig::default())
    }
}

pub struct Pipeline {
    invoker: Arc<dyn ModelInvoker>,
    generator: CaseGenerator,
    gate: ConcurrencyGate,
    title: TitleConfig,
}

impl Pipeline {
    pub fn new(invoker: Arc<dyn ModelInvoker>, settings: PipelineSettings) -> Self {
        Self {
            generator: CaseGenerator::new(invoker.clone(), settings.retry),
            gate: ConcurrencyGate::new(settings.max_concurrent),
            title: settings.title,
            invoker,
        }
    }

    /// Run every stage in order.
    pub async fn run(
        &self,
        ctx: &RunContext,
        source_text: &str,
    ) -> Result<PipelineReport, PipelineError> {
        async {
            let mut machine = StageMachine::new();
            info!(
                source_chars = source_text.chars().count(),
                prompt_version = prompts::PROMPT_VERSION,
                "pipeline started"
            );

            match self
                .run_stages(ctx, &mut machine, PipelineState::new(source_text))
                .await
            {
                Ok(state) => {
                    machine.advance(Stage::Completed, None)?;
                    let report = PipelineReport {
                        run_id: ctx.run_id.to_string(),
                        title: state.title_or_empty().to_string(),
                        dedup_summary: state.dedup_summary.unwrap_or_default(),
                        collection: state.case_collection,
                        transitions: machine.into_transitions(),
                        elapsed_ms: ctx.elapsed_ms(),
                    };
                    info!(
                        elapsed_s = ctx.elapsed_s(),
                        cases = report.collection.len(),
                        failed = report.collection.failed_cases.len(),
                        "pipeline completed"
                    );
                    Ok(report)
                }
                Err(e) => {
                    if let Err(transition) = machine.fail(&e.to_string()) {
                        warn!(error = %transition, "could not record failed transition");
                    }
                    error!(
                        elapsed_s = ctx.elapsed_s(),
                        stage = %e.stage(),
                        error = %e,
                        "pipeline failed"
                    );
                    Err(e)
                }
            }
        }
        .instrument(ctx.span())
        .await
    }

    async fn run_stages(
        &self,
        ctx: &RunContext,
        machine: &mut StageMachine,
        state: PipelineState,
    ) -> Result<PipelineState, PipelineError> {
        let state = self.extract_title(ctx, state).await;
        machine.advance(Stage::RequirementExtraction, state.title.as_deref())?;

        let state = self.extract_requirements(ctx, state).await?;
        machine.advance(Stage::RequirementOptimization, None)?;

        let state = self.optimize_requirements(ctx, state).await?;
        machine.advance(Stage::CaseGeneration, None)?;

        let state = self.generate_cases(ctx, state).await?;
        let reason = format!(
            "{} generated, {} failed",
            state.case_collection.len(),
            state.case_collection.failed_cases.len()
        );
        machine.advance(Stage::Validation, Some(&reason))?;

        Ok(self.validate(ctx, state))
    }

    /// Stage 1. Falls back to the configured default title on any failure.
    pub async fn extract_title(&self, ctx: &RunContext, state: PipelineState) -> PipelineState {
        let heading = state
            .source_text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(strip_heading)
            .find(|line| !line.is_empty() && line.chars().count() < MAX_HEADING_TITLE_CHARS);

        let title = if let Some(heading) = heading {
            info!(elapsed_s = ctx.elapsed_s(), title = %heading, "title taken from document line");
            heading
        } else {
            let prefix: String = state.source_text.chars().take(self.title.prefix_chars).collect();
            let payload = PromptPayload::text(prompts::title_prompt(&prefix))
                .with_system(prompts::QA_ENGINEER_SYSTEM);
            match self.invoker.invoke(&payload).await {
                Ok(raw) => {
                    let candidate = raw.trim().lines().next().map(strip_heading).unwrap_or_default();
                    if candidate.is_empty() {
                        warn!(
                            elapsed_s = ctx.elapsed_s(),
                            "model returned an empty title, using default"
                        );
                        self.title.default_title.clone()
                    } else {
                        info!(elapsed_s = ctx.elapsed_s(), title = %candidate, "title extracted by model");
                        candidate
                    }
                }
                Err(e) => {
                    warn!(
                        elapsed_s = ctx.elapsed_s(),
                        error = %e,
                        "title extraction failed, using default"
                    );
                    self.title.default_title.clone()
                }
            }
        };

        PipelineState {
            title: Some(title),
            ..state
        }
    }

    /// Stage 2. One model call over the whole source text.
    pub async fn extract_requirements(
        &self,
        ctx: &RunContext,
        state: PipelineState,
    ) -> Result<PipelineState, PipelineError> {
        let payload = PromptPayload::text(prompts::extraction_prompt(&state.source_text))
            .with_system(prompts::QA_ENGINEER_SYSTEM);
        let outline = self
            .invoker
            .invoke(&payload)
            .await
            .map_err(|source| PipelineError::Stage {
                stage: Stage::RequirementExtraction,
                source,
            })?
            .trim()
            .to_string();

        info!(
            elapsed_s = ctx.elapsed_s(),
            outline_lines = outline.lines().count(),
            "requirements extracted"
        );

        Ok(PipelineState {
            requirement_outline: Some(outline),
            ..state
        })
    }

    /// Stage 3. One model call that rewrites the outline.
    pub async fn optimize_requirements(
        &self,
        ctx: &RunContext,
        state: PipelineState,
    ) -> Result<PipelineState, PipelineError> {
        let payload = PromptPayload::text(prompts::optimization_prompt(state.outline_or_empty()))
            .with_system(prompts::QA_ENGINEER_SYSTEM);
        let outline = self
            .invoker
            .invoke(&payload)
            .await
            .map_err(|source| PipelineError::Stage {
                stage: Stage::RequirementOptimization,
                source,
            })?
            .trim()
            .to_string();

        info!(
            elapsed_s = ctx.elapsed_s(),
            outline_lines = outline.lines().count(),
            "requirements optimized"
        );

        Ok(PipelineState {
            requirement_outline: Some(outline),
            ..state
        })
    }

    /// Stage 4. One generation task per requirement point.
    pub async fn generate_cases(
        &self,
        ctx: &RunContext,
        state: PipelineState,
    ) -> Result<PipelineState, PipelineError> {
        let points = split_requirement_points(state.outline_or_empty());
        if points.is_empty() {
            return Err(PipelineError::NoRequirementPoints);
        }
        info!(
            elapsed_s = ctx.elapsed_s(),
            points = points.len(),
            max_concurrent = self.gate.capacity(),
            "generating cases"
        );

        let batch = self.generator.generate_batch(&points, &self.gate).await;
        for failed in &batch.failed {
            warn!(
                case_id = %failed.case_id,
                requirement = %failed.requirement,
                "requirement point produced no case"
            );
        }

        let case_collection = CaseCollection {
            test_suite: state.title_or_empty().to_string(),
            test_cases: batch.cases,
            failed_cases: batch.failed,
        };
        Ok(PipelineState {
            case_collection,
            ..state
        })
    }

    /// Stage 5. Exact-match dedup; failed points pass through untouched.
    pub fn validate(&self, ctx: &RunContext, mut state: PipelineState) -> PipelineState {
        if state.case_collection.is_empty() {
            warn!(elapsed_s = ctx.elapsed_s(), "no cases to validate");
            return PipelineState {
                dedup_summary: Some("No cases to validate".to_string()),
                ..state
            };
        }

        let cases = std::mem::take(&mut state.case_collection.test_cases);
        let outcome = dedup_exact(cases);
        let summary = outcome.summary();
        info!(
            elapsed_s = ctx.elapsed_s(),
            removed = outcome.removed,
            kept = outcome.cases.len(),
            "validation complete"
        );

        PipelineState {
            case_collection: CaseCollection {
                test_cases: outcome.cases,
                ..state.case_collection
            },
            dedup_summary: Some(summary),
            ..state
        }
    }
}

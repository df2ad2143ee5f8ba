//! LLM-driven test-case generation and golden-set evaluation.
//!
//! - [`pipeline`]: five-stage generation run over one requirement document
//! - [`generator`]: per-requirement case generation under a concurrency gate
//! - [`evaluator`]: AI-vs-golden comparison with weighted scoring
//! - [`invoker`]: the model transport seam
//! - [`artifacts`] / [`report`]: JSON and Markdown outputs

pub mod artifacts;
pub mod config;
pub mod context;
pub mod document;
pub mod errors;
pub mod evaluator;
pub mod generator;
pub mod invoker;
pub mod pipeline;
pub mod prompts;
pub mod report;
pub mod state_machine;

pub use artifacts::{ArtifactKind, ArtifactSink, FsArtifactSink};
pub use config::CasegenConfig;
pub use context::RunContext;
pub use document::{DocumentExtractor, PlainTextExtractor};
pub use errors::{
    ArtifactError, ConfigError, ExtractError, GenerationError, GenerationFailure,
    InvocationFailure, PipelineError, RetryCategory,
};
pub use evaluator::{Evaluator, EvaluatorSettings, ScoreReport};
pub use generator::{CaseGenerator, ConcurrencyGate, GenerationBatch, RetryPolicy};
pub use invoker::{ChatCompletionInvoker, ModelInvoker, PromptPayload};
pub use pipeline::{Pipeline, PipelineReport, PipelineSettings, PipelineState};
pub use state_machine::{Stage, StageMachine, StageTransition};

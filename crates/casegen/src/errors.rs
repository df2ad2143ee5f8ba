//! Error taxonomy for the generation pipeline, with retry classification.
//!
//! Callers query `retry_category()` / `is_retriable()` instead of matching on
//! message text.
//!
//! ## Retry categories
//!
//! | Category      | Retriable | Who retries                        |
//! |---------------|-----------|------------------------------------|
//! | Transient     | yes       | generator, evaluator               |
//! | RateLimit     | yes       | generator, evaluator               |
//! | ParseFailure  | yes       | generator (evaluator degrades)     |
//! | Fatal         | no        | nobody; the run aborts             |

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::state_machine::Stage;

/// Classification used to decide whether a failed attempt may be repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCategory {
    /// Network error, timeout or server-side failure.
    Transient,
    /// HTTP 429 from the model service.
    RateLimit,
    /// Model output did not match the expected schema.
    ParseFailure,
    /// Configuration or programming error. Terminal.
    Fatal,
}

impl RetryCategory {
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::Transient | Self::RateLimit | Self::ParseFailure)
    }
}

impl fmt::Display for RetryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::ParseFailure => write!(f, "parse_failure"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// One model call that did not yield usable text.
#[derive(Debug, Clone, Error)]
pub enum InvocationFailure {
    /// Connection, DNS or deadline failure.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Non-2xx response; `body` is a bounded excerpt.
    #[error("Model service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// 2xx response without `choices[0].message.content`, or a non-JSON body.
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),
}

impl InvocationFailure {
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::Status { status: 429, .. } => RetryCategory::RateLimit,
            Self::Transport(_) | Self::Status { .. } | Self::MalformedResponse(_) => {
                RetryCategory::Transient
            }
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.retry_category().is_retriable()
    }
}

/// Why a single generation attempt failed.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Invocation(#[from] InvocationFailure),

    #[error("Parse failure: {0}")]
    ParseFailure(String),

    /// The concurrency gate was closed while waiting for a permit.
    #[error("Concurrency gate closed")]
    GateClosed,
}

impl GenerationError {
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::Invocation(failure) => failure.retry_category(),
            Self::ParseFailure(_) => RetryCategory::ParseFailure,
            Self::GateClosed => RetryCategory::Fatal,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.retry_category().is_retriable()
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::ParseFailure(message.into())
    }
}

/// A requirement point whose retry budget ran out.
#[derive(Debug, Clone, Error)]
#[error("Requirement point {ordinal} failed after {attempts} attempt(s): {last}")]
pub struct GenerationFailure {
    /// 1-based position of the point in the outline.
    pub ordinal: usize,
    pub attempts: u32,
    #[source]
    pub last: GenerationError,
}

/// Fatal pipeline errors. Soft degradations are logged, not returned.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Stage {stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: InvocationFailure,
    },

    #[error("Requirement outline contains no usable points")]
    NoRequirementPoints,

    #[error("Illegal stage transition: {from} → {to}")]
    IllegalTransition { from: Stage, to: Stage },
}

impl PipelineError {
    /// The stage the run was in when it failed.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Stage { stage, .. } => *stage,
            Self::NoRequirementPoints => Stage::CaseGeneration,
            Self::IllegalTransition { from, .. } => *from,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Document `{filename}` is not valid UTF-8")]
    InvalidEncoding { filename: String },
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Artifact already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Failed to write artifact {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize artifact: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

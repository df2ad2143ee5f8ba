//! Pipeline stage machine: explicit stages and legal transition guards.
//!
//! Every transition is checked against the stage graph and recorded, so the
//! run report shows exactly which stages ran and how long each took.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;

/// Pipeline stages. Every run starts at `TitleExtraction` and ends at either
/// `Completed` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    TitleExtraction,
    RequirementExtraction,
    RequirementOptimization,
    CaseGeneration,
    Validation,
    /// Terminal success.
    Completed,
    /// Terminal failure.
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TitleExtraction => write!(f, "TitleExtraction"),
            Self::RequirementExtraction => write!(f, "RequirementExtraction"),
            Self::RequirementOptimization => write!(f, "RequirementOptimization"),
            Self::CaseGeneration => write!(f, "CaseGeneration"),
            Self::Validation => write!(f, "Validation"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// ```text
/// TitleExtraction → RequirementExtraction → RequirementOptimization
///   → CaseGeneration → Validation → Completed
/// any non-terminal stage → Failed
/// ```
fn is_legal_transition(from: Stage, to: Stage) -> bool {
    use Stage::*;

    if to == Failed && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (TitleExtraction, RequirementExtraction)
            | (RequirementExtraction, RequirementOptimization)
            | (RequirementOptimization, CaseGeneration)
            | (CaseGeneration, Validation)
            | (Validation, Completed)
    )
}

/// A single recorded transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: Stage,
    pub to: Stage,
    /// Milliseconds since the machine was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub struct StageMachine {
    current: Stage,
    created_at: Instant,
    transitions: Vec<StageTransition>,
}

impl StageMachine {
    pub fn new() -> Self {
        Self {
            current: Stage::TitleExtraction,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    /// Move to `to` if the stage graph allows it.
    pub fn advance(&mut self, to: Stage, reason: Option<&str>) -> Result<(), PipelineError> {
        if !is_legal_transition(self.current, to) {
            return Err(PipelineError::IllegalTransition {
                from: self.current,
                to,
            });
        }

        let record = StageTransition {
            from: self.current,
            to,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        };

        tracing::debug!(from = %self.current, to = %to, "stage transition");

        self.transitions.push(record);
        self.current = to;
        Ok(())
    }

    /// Transition to `Failed`; always legal from non-terminal stages.
    pub fn fail(&mut self, reason: &str) -> Result<(), PipelineError> {
        self.advance(Stage::Failed, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[StageTransition] {
        &self.transitions
    }

    pub fn into_transitions(self) -> Vec<StageTransition> {
        self.transitions
    }
}

impl Default for StageMachine {
    fn default() -> Self {
        Self::new()
    }
}

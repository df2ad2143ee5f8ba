//! Write-once report artifacts.
//!
//! ```text
//! <output_dir>/
//!   testcases/test_cases-<stamp>.json
//!   testcases/test_cases-<stamp>.md
//!   evaluation/evaluation_report-<stamp>.json
//!   evaluation/evaluation_report-<stamp>.md
//! ```
//!
//! `<stamp>` is the run's start time (`%Y%m%d%H%M%S`). An existing file is
//! never overwritten.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use case_quality::CaseCollection;
use tracing::info;

use crate::context::RunContext;
use crate::errors::ArtifactError;
use crate::evaluator::ScoreReport;
use crate::report;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    TestCases,
    Evaluation,
}

impl ArtifactKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::TestCases => "testcases",
            Self::Evaluation => "evaluation",
        }
    }

    pub fn file_stem(self) -> &'static str {
        match self {
            Self::TestCases => "test_cases",
            Self::Evaluation => "evaluation_report",
        }
    }

    /// `test_cases-<stamp>.<extension>`
    pub fn file_name(self, stamp: &str, extension: &str) -> String {
        format!("{}-{stamp}.{extension}", self.file_stem())
    }
}

/// Destination for generated reports.
pub trait ArtifactSink: Send + Sync {
    /// Persist `contents` as `name` under `kind`. Returns where it landed.
    fn write(&self, kind: ArtifactKind, name: &str, contents: &str)
        -> Result<PathBuf, ArtifactError>;
}

/// Filesystem sink rooted at the configured output directory.
#[derive(Debug, Clone)]
pub struct FsArtifactSink {
    root: PathBuf,
}

impl FsArtifactSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactSink for FsArtifactSink {
    fn write(
        &self,
        kind: ArtifactKind,
        name: &str,
        contents: &str,
    ) -> Result<PathBuf, ArtifactError> {
        let dir = self.root.join(kind.dir_name());
        fs::create_dir_all(&dir).map_err(|source| ArtifactError::Io {
            path: dir.clone(),
            source,
        })?;

        let path = dir.join(name);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| {
                if source.kind() == ErrorKind::AlreadyExists {
                    ArtifactError::AlreadyExists(path.clone())
                } else {
                    ArtifactError::Io {
                        path: path.clone(),
                        source,
                    }
                }
            })?;
        file.write_all(contents.as_bytes())
            .map_err(|source| ArtifactError::Io {
                path: path.clone(),
                source,
            })?;

        info!(path = %path.display(), bytes = contents.len(), "artifact written");
        Ok(path)
    }
}

/// Write the collection as JSON and Markdown.
pub fn persist_collection(
    sink: &dyn ArtifactSink,
    ctx: &RunContext,
    collection: &CaseCollection,
) -> Result<Vec<PathBuf>, ArtifactError> {
    let stamp = ctx.artifact_stamp();
    let kind = ArtifactKind::TestCases;
    let json = serde_json::to_string_pretty(collection)?;
    Ok(vec![
        sink.write(kind, &kind.file_name(&stamp, "json"), &json)?,
        sink.write(
            kind,
            &kind.file_name(&stamp, "md"),
            &report::render_collection(collection),
        )?,
    ])
}

/// Write the score report as JSON and Markdown.
pub fn persist_score_report(
    sink: &dyn ArtifactSink,
    ctx: &RunContext,
    score: &ScoreReport,
) -> Result<Vec<PathBuf>, ArtifactError> {
    let stamp = ctx.artifact_stamp();
    let kind = ArtifactKind::Evaluation;
    let json = serde_json::to_string_pretty(score)?;
    Ok(vec![
        sink.write(kind, &kind.file_name(&stamp, "json"), &json)?,
        sink.write(
            kind,
            &kind.file_name(&stamp, "md"),
            &report::render_score_report(score),
        )?,
    ])
}

use thiserror::Error;

/// Failure to map an external case file onto canonical records.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The text is not valid JSON.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Valid JSON, but none of the known case-file layouts.
    #[error("Unrecognized case file format: {0}")]
    UnrecognizedFormat(String),

    /// A single case entry could not be read.
    #[error("Invalid case at index {index}: {reason}")]
    InvalidCase { index: usize, reason: String },
}

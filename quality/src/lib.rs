//! Deterministic test-case quality logic.
//!
//! Everything here is synchronous and I/O free: the case data model,
//! normalization of externally supplied case files, duplicate detection and
//! exact-match dedup. The async orchestrator in `casegen` builds on it.

pub mod case;
pub mod dedup;
pub mod duplicates;
pub mod error;
pub mod normalize;
pub mod similarity;

pub use case::{
    format_case_id, ids_are_contiguous, renumber, CaseCollection, FailedPoint, TestCase,
};
pub use dedup::{dedup_exact, DedupOutcome};
pub use duplicates::{
    detect, DuplicateCandidate, DuplicateReport, StepsDuplicateGroup,
    TitleDuplicate, SIMILARITY_THRESHOLD,
};
pub use error::NormalizeError;
pub use normalize::{normalize_case_document, CaseDocument, CaseRecord};
pub use similarity::similarity_ratio;

use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::Span;
use uuid::Uuid;

/// Format used to key artifact file names.
pub const ARTIFACT_STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Per-run identity and timing, passed explicitly to every stage.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    /// Human-readable label, usually the input file name.
    pub label: String,
    pub started_at: DateTime<Utc>,
    started: Instant,
    pub model: String,
}

impl RunContext {
    pub fn new(label: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            label: label.into(),
            started_at: Utc::now(),
            started: Instant::now(),
            model: model.into(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn elapsed_s(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Timestamp that keys this run's artifact files.
    pub fn artifact_stamp(&self) -> String {
        self.started_at.format(ARTIFACT_STAMP_FORMAT).to_string()
    }

    /// Span every log line of this run is emitted under.
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "run",
            run_id = %self.run_id,
            label = %self.label,
            model = %self.model
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn artifact_stamp_is_compact_utc() {
        let mut ctx = RunContext::new("req.md", "m");
        ctx.started_at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(ctx.artifact_stamp(), "20260304050607");
    }

    #[test]
    fn each_run_gets_its_own_id() {
        let a = RunContext::new("a", "m");
        let b = RunContext::new("a", "m");
        assert_ne!(a.run_id, b.run_id);
    }
}

//! Turns commit history into persisted summaries: one per ISO week, or one
//! per batch of commits since the last analysis.

pub mod analyzer;
pub mod engine;

pub use analyzer::{Analyzer, RangeOutcome};
pub use engine::{BackfillSummary, ReportEngine, WeekFailure, WeekOutcome};

/// Map a store failure to `Error::ReportPersistence`, keeping the cause chain.
pub(crate) fn persist<T>(result: anyhow::Result<T>) -> saga_core::Result<T> {
    result.map_err(|e| saga_core::Error::persistence(format!("{e:#}")))
}

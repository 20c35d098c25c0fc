use thiserror::Error;

/// Errors surfaced by the analysis engine.
///
/// Budget exhaustion is not represented here: a denied diff fetch is a normal
/// tool outcome returned to the model.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or unusable backend credentials/configuration. Fatal before any work.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A week label did not match `YYYY-Www`.
    #[error("invalid week label {label:?}: {reason}")]
    WeekFormat { label: String, reason: String },

    /// A (year, week) pair that does not exist in the ISO calendar.
    #[error("invalid ISO week {year}-W{week:02}")]
    InvalidWeek { year: i32, week: u32 },

    /// The version control collaborator failed to enumerate commits.
    #[error("failed to resolve commits: {0}")]
    RangeResolution(String),

    /// A single tool invocation failed. Never aborts the agent loop.
    #[error("tool {tool} failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// Transport or model-level failure during generation.
    #[error("model error: {0}")]
    Model(String),

    /// The model kept requesting tools past the configured turn limit.
    #[error("agent exceeded {0} model turns without finishing")]
    TurnLimit(u32),

    /// Storing an analysis run or report failed.
    #[error("failed to persist report: {0}")]
    ReportPersistence(String),

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn range(err: impl std::fmt::Display) -> Self {
        Error::RangeResolution(err.to_string())
    }

    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Error::ReportPersistence(err.to_string())
    }

    pub fn model(err: impl std::fmt::Display) -> Self {
        Error::Model(err.to_string())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub mod paths;
pub mod sqlite_store;

pub use paths::SagaPaths;
pub use sqlite_store::SqliteStore;

use saga_core::{
    AnalysisRun, BudgetMetadata, RepoId, ReportContent, Repository, RunKind, WeeklyReport,
};

/// Persistence for repositories, analysis runs and weekly reports.
///
/// Reports are unique per `(repository, year, week)`; `update_report` keeps a
/// report's id and `created_at`.
pub trait ReportStore {
    /// Create the repository, or refresh its path and branch. Keyed by name.
    fn ensure_repository(
        &self,
        name: &str,
        path: &str,
        description: Option<&str>,
        tracked_branch: &str,
    ) -> anyhow::Result<Repository>;

    fn repository(&self, name: &str) -> anyhow::Result<Option<Repository>>;

    /// Record the last analyzed commit.
    fn set_watermark(&self, repo: RepoId, sha: &str) -> anyhow::Result<()>;

    fn create_analysis_run(
        &self,
        repo: RepoId,
        kind: RunKind,
        from_sha: Option<&str>,
        to_sha: &str,
        agent_mode: bool,
    ) -> anyhow::Result<AnalysisRun>;

    fn complete_analysis_run(
        &self,
        run_id: &str,
        summary: &str,
        budget: Option<&BudgetMetadata>,
    ) -> anyhow::Result<()>;

    /// Most recently completed run of `kind`.
    fn latest_analysis_run(
        &self,
        repo: RepoId,
        kind: RunKind,
    ) -> anyhow::Result<Option<AnalysisRun>>;

    fn report(&self, repo: RepoId, year: i32, week: u32) -> anyhow::Result<Option<WeeklyReport>>;

    fn report_exists(&self, repo: RepoId, year: i32, week: u32) -> anyhow::Result<bool>;

    fn insert_report(
        &self,
        repo: RepoId,
        year: i32,
        week: u32,
        content: &ReportContent,
    ) -> anyhow::Result<WeeklyReport>;

    fn update_report(
        &self,
        repo: RepoId,
        year: i32,
        week: u32,
        content: &ReportContent,
    ) -> anyhow::Result<WeeklyReport>;

    fn latest_report(&self, repo: RepoId) -> anyhow::Result<Option<WeeklyReport>>;

    /// Newest period first; `None` lists all.
    fn list_reports(
        &self,
        repo: RepoId,
        limit: Option<usize>,
    ) -> anyhow::Result<Vec<WeeklyReport>>;
}

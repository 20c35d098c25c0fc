//! Weekly report upserts.
//!
//! Per `(repository, year, week)` a report is either absent or present.
//! Absent becomes present when the week has commits; present is only
//! overwritten on request, keeping the report's id and creation time.

use saga_agent::{Orchestrator, PromptContext, TextGenerator};
use saga_core::config::SagaConfig;
use saga_core::iso_week::{weeks_in_range, IsoWeek};
use saga_core::{
    format_rfc3339, Error, ReportContent, ReportMetadata, Repository, Result, RunKind,
    WeeklyReport,
};
use saga_git::{RangeResolver, VersionControl};
use saga_store::ReportStore;
use serde::Serialize;
use time::Date;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::persist;

// ── Outcomes ──

#[derive(Debug, Clone)]
pub enum WeekOutcome {
    Generated(WeeklyReport),
    Regenerated(WeeklyReport),
    /// A report exists and regeneration was not forced.
    Skipped,
    /// The week has no commits on the tracked branch; nothing was stored.
    NoCommits,
}

impl WeekOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            WeekOutcome::Generated(_) => "generated",
            WeekOutcome::Regenerated(_) => "regenerated",
            WeekOutcome::Skipped => "skipped",
            WeekOutcome::NoCommits => "no commits",
        }
    }

    pub fn report(&self) -> Option<&WeeklyReport> {
        match self {
            WeekOutcome::Generated(r) | WeekOutcome::Regenerated(r) => Some(r),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekFailure {
    pub week: IsoWeek,
    pub error: String,
}

/// Per-outcome counts of a backfill.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillSummary {
    pub generated: usize,
    pub regenerated: usize,
    pub skipped: usize,
    pub no_commits: usize,
    pub failed: usize,
    pub failures: Vec<WeekFailure>,
}

impl BackfillSummary {
    pub fn weeks(&self) -> usize {
        self.generated + self.regenerated + self.skipped + self.no_commits + self.failed
    }
}

// ── Engine ──

pub struct ReportEngine<'a> {
    store: &'a dyn ReportStore,
    vcs: &'a dyn VersionControl,
    generator: &'a dyn TextGenerator,
    config: &'a SagaConfig,
}

impl<'a> ReportEngine<'a> {
    pub fn new(
        store: &'a dyn ReportStore,
        vcs: &'a dyn VersionControl,
        generator: &'a dyn TextGenerator,
        config: &'a SagaConfig,
    ) -> Self {
        Self {
            store,
            vcs,
            generator,
            config,
        }
    }

    /// Generate, regenerate or skip the report for one week.
    ///
    /// Nothing is written to the report table unless the whole analysis
    /// succeeds; an aborted attempt leaves only an incomplete analysis run.
    pub async fn generate_week(
        &self,
        repo: &Repository,
        week: IsoWeek,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<WeekOutcome> {
        let exists = persist(self.store.report_exists(repo.id, week.year, week.week))?;
        if exists && !force {
            info!(repo = %repo.name, week = %week, "report exists, skipping");
            return Ok(WeekOutcome::Skipped);
        }

        let (start, end) = week.bounds()?;
        let resolver = RangeResolver::new(self.vcs, repo.tracked_branch.as_str());
        let commits = resolver.resolve_week(week, cancel).await?;
        if commits.is_empty() {
            info!(repo = %repo.name, week = %week, "no commits");
            return Ok(WeekOutcome::NoCommits);
        }

        let activity = match resolver
            .resolve_branch_activity(&repo.tracked_branch, week, cancel)
            .await
        {
            Ok(a) => a,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                warn!(repo = %repo.name, week = %week, error = %e, "branch activity unavailable");
                Vec::new()
            }
        };

        let prev = week.previous();
        let previous_summary =
            persist(self.store.report(repo.id, prev.year, prev.week))?.map(|r| r.summary);

        let run = persist(self.store.create_analysis_run(
            repo.id,
            RunKind::Week,
            None,
            &commits[0].sha,
            self.config.agent.enabled,
        ))?;

        let period = format!("week {}", week.label());
        let ctx = PromptContext {
            description: repo.description.as_deref(),
            period: Some(period.as_str()),
            branch_activity: &activity,
            previous_summary: previous_summary.as_deref(),
            ..PromptContext::new(&repo.name, &repo.tracked_branch, &commits)
        };
        let output = Orchestrator::new(self.generator, self.vcs, &self.config.agent)
            .run(&ctx, cancel)
            .await?;

        persist(self.store.complete_analysis_run(
            &run.id,
            &output.summary,
            output.budget.as_ref(),
        ))?;

        let content = ReportContent {
            week_start: format_rfc3339(start),
            week_end: format_rfc3339(end),
            summary: output.summary,
            commit_count: commits.len(),
            metadata: ReportMetadata::from_commits(&commits),
            agent_mode: output.agent_mode,
            budget: output.budget,
            analysis_run_id: Some(run.id),
        };

        if exists {
            let report =
                persist(self.store.update_report(repo.id, week.year, week.week, &content))?;
            info!(
                repo = %repo.name, week = %week, commits = report.commit_count,
                "report regenerated"
            );
            Ok(WeekOutcome::Regenerated(report))
        } else {
            let report =
                persist(self.store.insert_report(repo.id, week.year, week.week, &content))?;
            info!(
                repo = %repo.name, week = %week, commits = report.commit_count,
                "report generated"
            );
            Ok(WeekOutcome::Generated(report))
        }
    }

    /// Run [`generate_week`](Self::generate_week) for every ISO week touching
    /// `[since, until]`, oldest first. A failed week is counted and the
    /// backfill continues; cancellation stops it.
    pub async fn backfill(
        &self,
        repo: &Repository,
        since: Date,
        until: Date,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<BackfillSummary> {
        let weeks = weeks_in_range(since, until);
        info!(repo = %repo.name, weeks = weeks.len(), %since, %until, "backfill");
        let mut summary = BackfillSummary::default();
        for week in weeks {
            match self.generate_week(repo, week, force, cancel).await {
                Ok(WeekOutcome::Generated(_)) => summary.generated += 1,
                Ok(WeekOutcome::Regenerated(_)) => summary.regenerated += 1,
                Ok(WeekOutcome::Skipped) => summary.skipped += 1,
                Ok(WeekOutcome::NoCommits) => summary.no_commits += 1,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!(repo = %repo.name, week = %week, error = %e, "week failed");
                    summary.failed += 1;
                    summary.failures.push(WeekFailure {
                        week,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(summary)
    }
}

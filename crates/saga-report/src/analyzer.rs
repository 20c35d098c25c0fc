use saga_agent::{AnalysisOutput, Orchestrator, PromptContext, TextGenerator};
use saga_core::config::SagaConfig;
use saga_core::{Repository, Result, RunId, RunKind};
use saga_git::{RangeResolver, VersionControl};
use saga_store::ReportStore;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::persist;

#[derive(Debug, Clone)]
pub enum RangeOutcome {
    /// The watermark already points at the branch tip.
    UpToDate { head: String },
    Analyzed {
        run_id: RunId,
        head: String,
        commit_count: usize,
        /// First analysis of a repository capped at `analysis.max_commits`.
        truncated: bool,
        output: AnalysisOutput,
    },
}

/// Summarizes commits added since the repository's watermark.
pub struct Analyzer<'a> {
    store: &'a dyn ReportStore,
    vcs: &'a dyn VersionControl,
    generator: &'a dyn TextGenerator,
    config: &'a SagaConfig,
}

impl<'a> Analyzer<'a> {
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

    /// Analyze `(watermark, head]` and advance the watermark to `head`.
    /// The watermark is left untouched when the analysis fails.
    pub async fn analyze_new_commits(
        &self,
        repo: &Repository,
        cancel: &CancellationToken,
    ) -> Result<RangeOutcome> {
        let resolver = RangeResolver::new(self.vcs, repo.tracked_branch.as_str());
        let head = resolver.head(cancel).await?;
        let watermark = repo.last_analyzed_sha.as_deref();
        let mut commits = resolver.resolve_range(watermark, &head, cancel).await?;
        if commits.is_empty() {
            info!(repo = %repo.name, %head, "up to date");
            return Ok(RangeOutcome::UpToDate { head });
        }

        let max = self.config.analysis.max_commits;
        let truncated = watermark.is_none() && commits.len() > max;
        if truncated {
            info!(repo = %repo.name, total = commits.len(), max, "first analysis, truncating");
            commits.truncate(max);
        }

        // Weekly runs cover arbitrary past periods; only range runs continue this one.
        let previous_summary = persist(self.store.latest_analysis_run(repo.id, RunKind::Range))?
            .and_then(|r| r.summary);
        let run = persist(self.store.create_analysis_run(
            repo.id,
            RunKind::Range,
            watermark,
            &head,
            self.config.agent.enabled,
        ))?;

        let period = match watermark {
            Some(w) => format!("commits after {}", &w[..w.len().min(7)]),
            None => "recent history".to_string(),
        };
        let ctx = PromptContext {
            description: repo.description.as_deref(),
            period: Some(period.as_str()),
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
        persist(self.store.set_watermark(repo.id, &head))?;
        info!(
            repo = %repo.name, run = %run.id, commits = commits.len(), %head,
            "analysis complete"
        );

        Ok(RangeOutcome::Analyzed {
            run_id: run.id,
            head,
            commit_count: commits.len(),
            truncated,
            output,
        })
    }
}

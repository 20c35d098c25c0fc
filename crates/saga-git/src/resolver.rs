//! Turns a watermark or an ISO week into the commits to summarize.

use std::collections::BTreeMap;

use saga_core::cancel::guard;
use saga_core::iso_week::IsoWeek;
use saga_core::{BranchActivity, Commit, Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::VersionControl;

pub struct RangeResolver<'a> {
    vcs: &'a dyn VersionControl,
    /// Branch (or rev) whose history is analyzed, e.g. `main` or `HEAD`.
    branch: String,
}

impl<'a> RangeResolver<'a> {
    pub fn new(vcs: &'a dyn VersionControl, branch: impl Into<String>) -> Self {
        Self {
            vcs,
            branch: branch.into(),
        }
    }

    /// Resolve the tracked branch's tip.
    pub async fn head(&self, cancel: &CancellationToken) -> Result<String> {
        guard(cancel, async {
            self.vcs.resolve_ref(&self.branch).await.map_err(Error::range)
        })
        .await
    }

    /// Commits after `watermark` up to and including `head`, newest first.
    /// Without a watermark, all history reachable from `head`; truncation is
    /// the caller's job.
    pub async fn resolve_range(
        &self,
        watermark: Option<&str>,
        head: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Commit>> {
        if watermark == Some(head) {
            return Ok(Vec::new());
        }
        let commits = guard(cancel, async {
            self.vcs
                .commits_in_range(watermark, head)
                .await
                .map_err(Error::range)
        })
        .await?;
        debug!(from = ?watermark, to = head, count = commits.len(), "resolved range");
        Ok(commits)
    }

    /// Commits on the tracked branch inside the week's inclusive bounds,
    /// newest first.
    pub async fn resolve_week(
        &self,
        week: IsoWeek,
        cancel: &CancellationToken,
    ) -> Result<Vec<Commit>> {
        let (start, end) = week.bounds()?;
        let mut commits = guard(cancel, async {
            self.vcs
                .commits_between(&self.branch, start, end)
                .await
                .map_err(Error::range)
        })
        .await?;
        commits.retain(|c| c.timestamp >= start && c.timestamp <= end);
        commits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        debug!(week = %week, count = commits.len(), "resolved week");
        Ok(commits)
    }

    /// Activity on remote branches other than `main_branch` during `week`.
    ///
    /// Symbolic refs and the main branch are skipped. A branch that fails to
    /// inspect is logged and left out; a branch with no unique commits is
    /// omitted. Sorted by branch name.
    pub async fn resolve_branch_activity(
        &self,
        main_branch: &str,
        week: IsoWeek,
        cancel: &CancellationToken,
    ) -> Result<Vec<BranchActivity>> {
        let (start, end) = week.bounds()?;
        let branches = guard(cancel, async {
            self.vcs.remote_branches().await.map_err(Error::range)
        })
        .await?;

        let main_ref = branches
            .iter()
            .find(|b| !b.symbolic && (b.short == main_branch || b.name == main_branch))
            .map(|b| b.name.clone())
            .unwrap_or_else(|| main_branch.to_string());

        let mut activity = Vec::new();
        for branch in branches {
            if branch.symbolic || branch.name == main_ref || branch.short == main_branch {
                continue;
            }
            let result = guard(cancel, async {
                self.vcs
                    .branch_unique_commits(&branch.name, &main_ref, start, end)
                    .await
                    .map_err(Error::range)
            })
            .await;
            let commits = match result {
                Ok(c) => c,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!(branch = %branch.name, error = %e, "skipping branch");
                    continue;
                }
            };
            if commits.is_empty() {
                continue;
            }
            let mut authors: BTreeMap<String, usize> = BTreeMap::new();
            for c in &commits {
                *authors.entry(c.author.clone()).or_default() += 1;
            }
            activity.push(BranchActivity {
                branch: branch.short.clone(),
                commit_count: commits.len(),
                authors,
            });
        }
        activity.sort_by(|a, b| a.branch.cmp(&b.branch));
        Ok(activity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockVcs;
    use time::macros::datetime;
    use time::OffsetDateTime;

    fn c(sha: &str, author: &str, ts: OffsetDateTime) -> Commit {
        Commit {
            sha: sha.into(),
            author: author.into(),
            timestamp: ts,
            message: format!("work {sha}"),
        }
    }

    fn week10() -> IsoWeek {
        // 2024-03-04 (Mon) .. 2024-03-10 (Sun)
        IsoWeek::new(2024, 10).unwrap()
    }

    #[tokio::test]
    async fn week_bounds_are_inclusive() {
        let vcs = MockVcs::new()
            .with_commit(c("before", "a", datetime!(2024-03-03 23:59:59 UTC)))
            .with_commit(c("first", "a", datetime!(2024-03-04 0:00 UTC)))
            .with_commit(c("mid", "a", datetime!(2024-03-07 12:00 UTC)))
            .with_commit(c("last", "a", datetime!(2024-03-10 23:59:59 UTC)))
            .with_commit(c("after", "a", datetime!(2024-03-11 0:00 UTC)));
        let r = RangeResolver::new(&vcs, "main");
        let commits = r
            .resolve_week(week10(), &CancellationToken::new())
            .await
            .unwrap();
        let shas: Vec<_> = commits.iter().map(|c| c.sha.as_str()).collect();
        assert_eq!(shas, vec!["last", "mid", "first"]);
    }

    #[tokio::test]
    async fn range_failure_is_range_resolution_error() {
        let vcs = MockVcs::new().with_failing_log();
        let r = RangeResolver::new(&vcs, "main");
        let err = r
            .resolve_range(None, "abc", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RangeResolution(_)));
    }

    #[tokio::test]
    async fn watermark_equal_to_head_is_empty() {
        let vcs = MockVcs::new().with_commit(c("c1", "a", datetime!(2024-01-01 0:00 UTC)));
        let r = RangeResolver::new(&vcs, "main");
        let commits = r
            .resolve_range(Some("c1"), "c1", &CancellationToken::new())
            .await
            .unwrap();
        assert!(commits.is_empty());
        assert!(vcs.calls().iter().all(|c| !c.starts_with("commits_in_range")));
    }

    #[tokio::test]
    async fn branch_activity_aggregates_and_skips() {
        let vcs = MockVcs::new()
            .with_commit(c("m1", "ana", datetime!(2024-03-05 9:00 UTC)))
            .with_symbolic_branch("origin/HEAD")
            .with_branch("origin/main", vec![])
            .with_branch(
                "origin/feat/search",
                vec![
                    c("f1", "bo", datetime!(2024-03-05 10:00 UTC)),
                    c("f2", "bo", datetime!(2024-03-06 10:00 UTC)),
                    c("f3", "cy", datetime!(2024-03-06 11:00 UTC)),
                    // Outside the week.
                    c("f0", "cy", datetime!(2024-02-20 11:00 UTC)),
                ],
            )
            .with_branch(
                "origin/stale",
                vec![c("s1", "bo", datetime!(2023-01-01 0:00 UTC))],
            )
            .with_broken_branch("origin/broken");
        let r = RangeResolver::new(&vcs, "main");
        let activity = r
            .resolve_branch_activity("main", week10(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(activity.len(), 1);
        let a = &activity[0];
        assert_eq!(a.branch, "feat/search");
        assert_eq!(a.commit_count, 3);
        assert_eq!(a.authors["bo"], 2);
        assert_eq!(a.authors["cy"], 1);

        let calls = vcs.calls();
        assert!(calls.iter().any(|c| c == "branch_unique_commits origin/broken ^origin/main"));
        assert!(!calls.iter().any(|c| c.contains("origin/HEAD ")));
    }

    #[tokio::test]
    async fn cancelled_before_call() {
        let vcs = MockVcs::new();
        let r = RangeResolver::new(&vcs, "main");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = r.resolve_week(week10(), &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(vcs.calls().is_empty());
    }
}

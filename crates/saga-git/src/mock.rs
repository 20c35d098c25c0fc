use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use saga_core::Commit;
use time::OffsetDateTime;

use crate::diff_filter::{DiffFilter, FilteredDiff};
use crate::error::GitError;
use crate::{AuthorStats, CommitDetail, RemoteBranch, VersionControl};

/// In-memory repository for tests. Commits are kept newest first; every
/// trait call is recorded and can be inspected with [`MockVcs::calls`].
#[derive(Default)]
pub struct MockVcs {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    commits: Vec<Commit>,
    diffs: HashMap<String, String>,
    branches: Vec<(RemoteBranch, Vec<Commit>)>,
    broken_branches: HashSet<String>,
    fail_log: bool,
    calls: Vec<String>,
}

impl MockVcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a commit to the main line. Commits are sorted newest first.
    pub fn with_commit(self, commit: Commit) -> Self {
        {
            let mut s = self.state.lock().unwrap();
            s.commits.push(commit);
            s.commits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        }
        self
    }

    pub fn with_diff(self, sha: &str, diff: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .diffs
            .insert(sha.to_string(), diff.to_string());
        self
    }

    /// Add a remote branch (e.g. `origin/feat`) with commits unique to it.
    pub fn with_branch(self, name: &str, commits: Vec<Commit>) -> Self {
        self.state
            .lock()
            .unwrap()
            .branches
            .push((RemoteBranch::new(name, false), commits));
        self
    }

    pub fn with_symbolic_branch(self, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .branches
            .push((RemoteBranch::new(name, true), Vec::new()));
        self
    }

    /// Inspecting this branch fails.
    pub fn with_broken_branch(self, name: &str) -> Self {
        {
            let mut s = self.state.lock().unwrap();
            s.branches.push((RemoteBranch::new(name, false), Vec::new()));
            s.broken_branches.insert(name.to_string());
        }
        self
    }

    /// All commit listing calls fail.
    pub fn with_failing_log(self) -> Self {
        self.state.lock().unwrap().fail_log = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn find_commit(&self, sha: &str) -> Result<Commit, GitError> {
        let s = self.state.lock().unwrap();
        s.commits
            .iter()
            .chain(s.branches.iter().flat_map(|(_, c)| c.iter()))
            .find(|c| c.sha == sha || (sha.len() >= 4 && c.sha.starts_with(sha)))
            .cloned()
            .ok_or_else(|| GitError::NotFound(sha.to_string()))
    }

    fn check_log(&self) -> Result<(), GitError> {
        if self.state.lock().unwrap().fail_log {
            return Err(GitError::Failed {
                command: "log".into(),
                stderr: "fatal: simulated failure".into(),
            });
        }
        Ok(())
    }

    fn diff_for(&self, sha: &str) -> Result<String, GitError> {
        let commit = self.find_commit(sha)?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .diffs
            .get(&commit.sha)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl VersionControl for MockVcs {
    async fn resolve_ref(&self, rev: &str) -> Result<String, GitError> {
        self.record(format!("resolve_ref {rev}"));
        if let Ok(c) = self.find_commit(rev) {
            return Ok(c.sha);
        }
        let s = self.state.lock().unwrap();
        if let Some((_, commits)) = s.branches.iter().find(|(b, _)| b.name == rev) {
            if let Some(c) = commits.first() {
                return Ok(c.sha.clone());
            }
        }
        s.commits
            .first()
            .map(|c| c.sha.clone())
            .ok_or_else(|| GitError::NotFound(rev.to_string()))
    }

    async fn commits_in_range(
        &self,
        from: Option<&str>,
        to: &str,
    ) -> Result<Vec<Commit>, GitError> {
        self.record(format!("commits_in_range {from:?} {to}"));
        self.check_log()?;
        let s = self.state.lock().unwrap();
        let start = s
            .commits
            .iter()
            .position(|c| c.sha == to)
            .ok_or_else(|| GitError::NotFound(to.to_string()))?;
        let end = match from {
            Some(from) => s
                .commits
                .iter()
                .position(|c| c.sha == from)
                .ok_or_else(|| GitError::NotFound(from.to_string()))?,
            None => s.commits.len(),
        };
        if end < start {
            return Ok(Vec::new());
        }
        Ok(s.commits[start..end].to_vec())
    }

    async fn commits_between(
        &self,
        rev: &str,
        since: OffsetDateTime,
        until: OffsetDateTime,
    ) -> Result<Vec<Commit>, GitError> {
        self.record(format!("commits_between {rev}"));
        self.check_log()?;
        let s = self.state.lock().unwrap();
        Ok(s.commits
            .iter()
            .filter(|c| c.timestamp >= since && c.timestamp <= until)
            .cloned()
            .collect())
    }

    async fn filtered_diff(&self, sha: &str) -> Result<FilteredDiff, GitError> {
        self.record(format!("filtered_diff {sha}"));
        let full = self.diff_for(sha)?;
        Ok(DiffFilter::default().apply(&full))
    }

    async fn full_diff(&self, sha: &str) -> Result<String, GitError> {
        self.record(format!("full_diff {sha}"));
        self.diff_for(sha)
    }

    async fn commit_detail(&self, sha: &str) -> Result<CommitDetail, GitError> {
        self.record(format!("commit_detail {sha}"));
        let c = self.find_commit(sha)?;
        Ok(CommitDetail {
            email: format!("{}@example.com", c.author.to_lowercase().replace(' ', ".")),
            sha: c.sha,
            author: c.author,
            timestamp: c.timestamp,
            message: c.message,
        })
    }

    async fn author_stats(&self, author: &str) -> Result<AuthorStats, GitError> {
        self.record(format!("author_stats {author}"));
        let s = self.state.lock().unwrap();
        let timestamps: Vec<OffsetDateTime> = s
            .commits
            .iter()
            .filter(|c| c.author == author)
            .map(|c| c.timestamp)
            .collect();
        Ok(AuthorStats::from_timestamps(author, &timestamps))
    }

    async fn remote_branches(&self) -> Result<Vec<RemoteBranch>, GitError> {
        self.record("remote_branches".into());
        self.check_log()?;
        let s = self.state.lock().unwrap();
        Ok(s.branches.iter().map(|(b, _)| b.clone()).collect())
    }

    async fn branch_unique_commits(
        &self,
        branch: &str,
        main_ref: &str,
        since: OffsetDateTime,
        until: OffsetDateTime,
    ) -> Result<Vec<Commit>, GitError> {
        self.record(format!("branch_unique_commits {branch} ^{main_ref}"));
        let s = self.state.lock().unwrap();
        if s.broken_branches.contains(branch) {
            return Err(GitError::Failed {
                command: format!("log {branch}"),
                stderr: "fatal: bad revision".into(),
            });
        }
        let main_shas: HashSet<&str> = s.commits.iter().map(|c| c.sha.as_str()).collect();
        let commits = s
            .branches
            .iter()
            .find(|(b, _)| b.name == branch)
            .map(|(_, commits)| commits.as_slice())
            .unwrap_or_default();
        Ok(commits
            .iter()
            .filter(|c| !main_shas.contains(c.sha.as_str()))
            .filter(|c| c.timestamp >= since && c.timestamp <= until)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn c(sha: &str, ts: OffsetDateTime) -> Commit {
        Commit {
            sha: sha.into(),
            author: "Ana".into(),
            timestamp: ts,
            message: format!("commit {sha}"),
        }
    }

    #[tokio::test]
    async fn range_is_exclusive_inclusive() {
        let vcs = MockVcs::new()
            .with_commit(c("c1", datetime!(2024-01-01 0:00 UTC)))
            .with_commit(c("c2", datetime!(2024-01-02 0:00 UTC)))
            .with_commit(c("c3", datetime!(2024-01-03 0:00 UTC)));
        let r = vcs.commits_in_range(Some("c1"), "c3").await.unwrap();
        let shas: Vec<_> = r.iter().map(|c| c.sha.as_str()).collect();
        assert_eq!(shas, vec!["c3", "c2"]);

        let all = vcs.commits_in_range(None, "c3").await.unwrap();
        assert_eq!(all.len(), 3);

        assert!(vcs.commits_in_range(Some("zz"), "c3").await.is_err());
        assert_eq!(vcs.resolve_ref("HEAD").await.unwrap(), "c3");
    }
}

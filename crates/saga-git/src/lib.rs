pub mod cli;
pub mod diff_filter;
pub mod error;
pub mod mock;
pub mod resolver;

pub use cli::GitCli;
pub use diff_filter::{DiffFilter, FilteredDiff, EXCLUDED_PATTERNS};
pub use error::GitError;
pub use mock::MockVcs;
pub use resolver::RangeResolver;

use saga_core::Commit;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Full metadata for a single commit, including the untruncated message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitDetail {
    pub sha: String,
    pub author: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub message: String,
}

/// Commit statistics for one exact author name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorStats {
    pub author: String,
    pub commit_count: usize,
    #[serde(with = "time::serde::rfc3339::option")]
    pub first_commit: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_commit: Option<OffsetDateTime>,
}

impl AuthorStats {
    /// Sentinel for an author with no matching history.
    pub fn empty(author: &str) -> Self {
        Self {
            author: author.to_string(),
            commit_count: 0,
            first_commit: None,
            last_commit: None,
        }
    }

    pub fn from_timestamps(author: &str, timestamps: &[OffsetDateTime]) -> Self {
        Self {
            author: author.to_string(),
            commit_count: timestamps.len(),
            first_commit: timestamps.iter().min().copied(),
            last_commit: timestamps.iter().max().copied(),
        }
    }
}

/// A remote-tracking branch, e.g. `origin/feature-x`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBranch {
    /// Full short ref name (`origin/feature-x`).
    pub name: String,
    /// Branch name without the remote prefix (`feature-x`).
    pub short: String,
    /// Symbolic pointer such as `origin/HEAD`.
    pub symbolic: bool,
}

impl RemoteBranch {
    pub fn new(name: &str, symbolic: bool) -> Self {
        let short = name.split_once('/').map(|(_, b)| b).unwrap_or(name);
        Self {
            name: name.to_string(),
            short: short.to_string(),
            symbolic,
        }
    }
}

/// Read access to a repository's history. Implemented by [`GitCli`] and
/// [`MockVcs`].
#[async_trait::async_trait]
pub trait VersionControl: Send + Sync {
    /// Resolve a revision (branch, tag, SHA) to a full SHA.
    async fn resolve_ref(&self, rev: &str) -> Result<String, GitError>;

    /// Commits after `from` (exclusive) up to and including `to`, newest first.
    /// `from = None` walks all history reachable from `to`.
    async fn commits_in_range(&self, from: Option<&str>, to: &str)
        -> Result<Vec<Commit>, GitError>;

    /// Commits on `rev` whose timestamp lies in `[since, until]`, newest first.
    async fn commits_between(
        &self,
        rev: &str,
        since: OffsetDateTime,
        until: OffsetDateTime,
    ) -> Result<Vec<Commit>, GitError>;

    /// Diff with vendored and lock-file paths removed.
    async fn filtered_diff(&self, sha: &str) -> Result<FilteredDiff, GitError>;

    /// Complete, unfiltered diff.
    async fn full_diff(&self, sha: &str) -> Result<String, GitError>;

    async fn commit_detail(&self, sha: &str) -> Result<CommitDetail, GitError>;

    /// Stats for commits whose author name equals `author` exactly.
    async fn author_stats(&self, author: &str) -> Result<AuthorStats, GitError>;

    async fn remote_branches(&self) -> Result<Vec<RemoteBranch>, GitError>;

    /// Commits on `branch` not reachable from `main_ref`, within `[since, until]`.
    async fn branch_unique_commits(
        &self,
        branch: &str,
        main_ref: &str,
        since: OffsetDateTime,
        until: OffsetDateTime,
    ) -> Result<Vec<Commit>, GitError>;
}

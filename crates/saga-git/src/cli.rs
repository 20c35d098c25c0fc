//! [`VersionControl`] backed by the `git` executable.

use std::path::{Path, PathBuf};

use saga_core::Commit;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::process::Command;
use tracing::debug;

use crate::diff_filter::{DiffFilter, FilteredDiff};
use crate::error::GitError;
use crate::{AuthorStats, CommitDetail, RemoteBranch, VersionControl};

/// Field separator (`%x1f`) and record separator (`%x1e`) keep multi-line
/// messages parseable.
const FIELD_SEP: char = '\x1f';
const RECORD_SEP: char = '\x1e';
const LOG_FORMAT: &str = "--format=%H%x1f%an%x1f%aI%x1f%B%x1e";

pub struct GitCli {
    repo_dir: PathBuf,
    remote: String,
    filter: DiffFilter,
}

impl GitCli {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            remote: "origin".into(),
            filter: DiffFilter::default(),
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Run `git <args>` in the repository and return stdout.
    /// The child is killed if the returned future is dropped.
    async fn git(&self, args: &[&str]) -> Result<String, GitError> {
        debug!(args = ?args, "git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .kill_on_drop(true)
            .output()
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitError::Failed {
                command: args.join(" "),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Resolve `rev` to a full commit id. Option-like revisions are rejected
    /// before git sees them.
    async fn verify_commit(&self, rev: &str) -> Result<String, GitError> {
        if rev.is_empty() || rev.starts_with('-') {
            return Err(GitError::NotFound(rev.to_string()));
        }
        let target = format!("{rev}^{{commit}}");
        match self
            .git(&["rev-parse", "--verify", "--quiet", "--end-of-options", &target])
            .await
        {
            Ok(out) => Ok(out.trim().to_string()),
            Err(GitError::Failed { .. }) => Err(GitError::NotFound(rev.to_string())),
            Err(e) => Err(e),
        }
    }

    async fn show_patch(&self, sha: &str) -> Result<String, GitError> {
        let commit = self.verify_commit(sha).await?;
        self.git(&[
            "show",
            "--format=",
            "--patch",
            "--no-color",
            "--no-ext-diff",
            "--end-of-options",
            &commit,
        ])
        .await
    }
}

#[async_trait::async_trait]
impl VersionControl for GitCli {
    async fn resolve_ref(&self, rev: &str) -> Result<String, GitError> {
        self.verify_commit(rev).await
    }

    async fn commits_in_range(
        &self,
        from: Option<&str>,
        to: &str,
    ) -> Result<Vec<Commit>, GitError> {
        let range = match from {
            Some(from) => format!("{from}..{to}"),
            None => to.to_string(),
        };
        let out = self
            .git(&["log", LOG_FORMAT, "--end-of-options", &range, "--"])
            .await?;
        parse_log(&out)
    }

    async fn commits_between(
        &self,
        rev: &str,
        since: OffsetDateTime,
        until: OffsetDateTime,
    ) -> Result<Vec<Commit>, GitError> {
        let out = self
            .git(&["log", LOG_FORMAT, "--end-of-options", rev, "--"])
            .await?;
        Ok(within(parse_log(&out)?, since, until))
    }

    async fn filtered_diff(&self, sha: &str) -> Result<FilteredDiff, GitError> {
        let full = self.show_patch(sha).await?;
        Ok(self.filter.apply(&full))
    }

    async fn full_diff(&self, sha: &str) -> Result<String, GitError> {
        self.show_patch(sha).await
    }

    async fn commit_detail(&self, sha: &str) -> Result<CommitDetail, GitError> {
        let commit = self.verify_commit(sha).await?;
        let out = self
            .git(&[
                "show",
                "-s",
                "--format=%H%x1f%an%x1f%ae%x1f%aI%x1f%B",
                "--end-of-options",
                &commit,
            ])
            .await?;
        let mut fields = out.splitn(5, FIELD_SEP);
        let mut next = |name: &str| {
            fields
                .next()
                .ok_or_else(|| GitError::Parse(format!("missing {name} for {sha}")))
        };
        let sha = next("sha")?.trim().to_string();
        let author = next("author")?.to_string();
        let email = next("email")?.to_string();
        let timestamp = parse_ts(next("date")?)?;
        let message = next("message")?.trim_end().to_string();
        Ok(CommitDetail {
            sha,
            author,
            email,
            timestamp,
            message,
        })
    }

    async fn author_stats(&self, author: &str) -> Result<AuthorStats, GitError> {
        // One argv element: the name is always the value of --author.
        let author_arg = format!("--author={author}");
        let out = self
            .git(&["log", "--fixed-strings", &author_arg, "--format=%an%x1f%aI"])
            .await?;
        let mut timestamps = Vec::new();
        for line in out.lines() {
            let Some((name, date)) = line.split_once(FIELD_SEP) else {
                continue;
            };
            // --author is a substring match on "name <email>"; keep exact names only.
            if name == author {
                timestamps.push(parse_ts(date)?);
            }
        }
        Ok(AuthorStats::from_timestamps(author, &timestamps))
    }

    async fn remote_branches(&self) -> Result<Vec<RemoteBranch>, GitError> {
        let prefix = format!("refs/remotes/{}", self.remote);
        let out = self
            .git(&["for-each-ref", "--format=%(refname:short)%1f%(symref)", &prefix])
            .await?;
        Ok(parse_for_each_ref(&out))
    }

    async fn branch_unique_commits(
        &self,
        branch: &str,
        main_ref: &str,
        since: OffsetDateTime,
        until: OffsetDateTime,
    ) -> Result<Vec<Commit>, GitError> {
        let exclude = format!("^{main_ref}");
        let out = self
            .git(&["log", LOG_FORMAT, "--end-of-options", branch, &exclude, "--"])
            .await?;
        Ok(within(parse_log(&out)?, since, until))
    }
}

// ── Parsing helpers ──

fn parse_ts(s: &str) -> Result<OffsetDateTime, GitError> {
    OffsetDateTime::parse(s.trim(), &Rfc3339)
        .map_err(|e| GitError::Parse(format!("bad timestamp {s:?}: {e}")))
}

/// Week windows apply to the author timestamp, inclusive on both ends.
/// `git log --since/--until` would filter on committer date instead.
fn within(commits: Vec<Commit>, since: OffsetDateTime, until: OffsetDateTime) -> Vec<Commit> {
    commits
        .into_iter()
        .filter(|c| c.timestamp >= since && c.timestamp <= until)
        .collect()
}

fn parse_log(out: &str) -> Result<Vec<Commit>, GitError> {
    let mut commits = Vec::new();
    for record in out.split(RECORD_SEP) {
        let record = record.trim_start_matches(['\n', '\r']);
        if record.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = record.splitn(4, FIELD_SEP).collect();
        if fields.len() != 4 {
            return Err(GitError::Parse(format!("malformed log record: {record:?}")));
        }
        commits.push(Commit {
            sha: fields[0].trim().to_string(),
            author: fields[1].to_string(),
            timestamp: parse_ts(fields[2])?,
            message: fields[3].trim_end().to_string(),
        });
    }
    Ok(commits)
}

fn parse_for_each_ref(out: &str) -> Vec<RemoteBranch> {
    out.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| match line.split_once(FIELD_SEP) {
            Some((name, symref)) => RemoteBranch::new(name, !symref.trim().is_empty()),
            None => RemoteBranch::new(line.trim(), false),
        })
        .collect()
}

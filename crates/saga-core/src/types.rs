use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Repository identifier in the store.
pub type RepoId = i64;

/// Analysis run ID format: `run_<ulid>`
pub type RunId = String;

// ── Version control records ──

/// A single commit as reported by the version control collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Commit {
    pub sha: String,
    pub author: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub message: String,
}

impl Commit {
    pub fn short_sha(&self) -> &str {
        &self.sha[..self.sha.len().min(7)]
    }

    /// First line of the message.
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim()
    }
}

/// Commits unique to one non-main branch within a week window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BranchActivity {
    pub branch: String,
    pub commit_count: usize,
    pub authors: BTreeMap<String, usize>,
}

// ── Budget audit payloads ──

/// One diff fetch charged against a run's budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiffFetchRecord {
    pub sha: String,
    pub size_bytes: u64,
    pub reason: String,
    pub timestamp: String,
}

/// Persisted snapshot of a run's budget usage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BudgetMetadata {
    pub fetch_count: u32,
    pub total_bytes: u64,
    pub estimated_tokens: u64,
    #[serde(default)]
    pub fetch_log: Vec<DiffFetchRecord>,
}

/// Persisted snapshot of who committed what in a report's window.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportMetadata {
    /// Unique author names, sorted.
    pub authors: Vec<String>,
    /// Commit SHAs in the order they were analyzed (newest first).
    #[serde(rename = "commitSHAs")]
    pub commit_shas: Vec<String>,
    #[serde(rename = "authorCounts")]
    pub author_counts: BTreeMap<String, usize>,
}

impl ReportMetadata {
    pub fn from_commits(commits: &[Commit]) -> Self {
        let mut authors = BTreeSet::new();
        let mut author_counts: BTreeMap<String, usize> = BTreeMap::new();
        for c in commits {
            authors.insert(c.author.clone());
            *author_counts.entry(c.author.clone()).or_default() += 1;
        }
        Self {
            authors: authors.into_iter().collect(),
            commit_shas: commits.iter().map(|c| c.sha.clone()).collect(),
            author_counts,
        }
    }
}

// ── Stored records ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Repository {
    pub id: RepoId,
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tracked_branch: String,
    /// Last commit analyzed; exclusive lower bound of the next range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_analyzed_sha: Option<String>,
    pub created_at: String,
}

/// What an analysis run covered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    /// Commits after the repository watermark.
    Range,
    /// One ISO week, producing a weekly report.
    Week,
}

impl RunKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RunKind::Range => "range",
            RunKind::Week => "week",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "range" => Some(RunKind::Range),
            "week" => Some(RunKind::Week),
            _ => None,
        }
    }
}

/// One execution of the analysis engine over a commit range or week.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalysisRun {
    pub id: RunId,
    pub repository_id: RepoId,
    pub kind: RunKind,
    /// Exclusive lower bound; `None` means "from the start of history".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_sha: Option<String>,
    /// Inclusive upper bound.
    pub to_sha: String,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub agent_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetMetadata>,
}

/// A weekly summary, unique per (repository, year, week).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeeklyReport {
    pub id: i64,
    pub repository_id: RepoId,
    pub year: i32,
    pub week: u32,
    pub week_start: String,
    pub week_end: String,
    pub summary: String,
    pub commit_count: usize,
    pub metadata: ReportMetadata,
    pub agent_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_run_id: Option<RunId>,
    pub created_at: String,
    pub updated_at: String,
}

/// Field values for creating or overwriting a weekly report.
#[derive(Debug, Clone)]
pub struct ReportContent {
    pub week_start: String,
    pub week_end: String,
    pub summary: String,
    pub commit_count: usize,
    pub metadata: ReportMetadata,
    pub agent_mode: bool,
    pub budget: Option<BudgetMetadata>,
    pub analysis_run_id: Option<RunId>,
}

//! The closed set of tools the model may call, and the gateway that runs them
//! against version control under a [`BudgetTracker`].

use saga_core::cancel::guard;
use saga_core::{Error, Result};
use saga_git::VersionControl;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::ToolDeclaration;
use crate::budget::BudgetTracker;

pub const FETCH_FILTERED_DIFF: &str = "fetch_filtered_diff";
pub const FETCH_FULL_DIFF: &str = "fetch_full_diff";
pub const FETCH_FULL_COMMIT_MESSAGE: &str = "fetch_full_commit_message";
pub const FETCH_AUTHOR_STATS: &str = "fetch_author_stats";

pub const TOOL_NAMES: &[&str] = &[
    FETCH_FILTERED_DIFF,
    FETCH_FULL_DIFF,
    FETCH_FULL_COMMIT_MESSAGE,
    FETCH_AUTHOR_STATS,
];

// ── Calls ──

const MIN_SHA_LEN: usize = 4;
const MAX_SHA_LEN: usize = 40;

/// Full or abbreviated hex object name. Anything else never reaches git.
fn is_commit_sha(sha: &str) -> bool {
    (MIN_SHA_LEN..=MAX_SHA_LEN).contains(&sha.len()) && sha.bytes().all(|b| b.is_ascii_hexdigit())
}

/// A validated tool call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "name", content = "input", rename_all = "snake_case")]
pub enum ToolCall {
    FetchFilteredDiff { sha: String, reason: String },
    FetchFullDiff { sha: String, reason: String },
    FetchFullCommitMessage { sha: String },
    FetchAuthorStats { author_name: String },
}

impl ToolCall {
    /// Validate a call by name. Unknown names and malformed arguments are
    /// reported as a message for the model, never as a failure.
    pub fn parse(name: &str, input: &Value) -> std::result::Result<Self, String> {
        if !TOOL_NAMES.contains(&name) {
            return Err(format!(
                "unknown tool `{name}`; available tools: {}",
                TOOL_NAMES.join(", ")
            ));
        }
        let call: ToolCall = serde_json::from_value(json!({ "name": name, "input": input }))
            .map_err(|e| format!("invalid arguments for `{name}`: {e}"))?;
        match &call {
            ToolCall::FetchFilteredDiff { sha, .. }
            | ToolCall::FetchFullDiff { sha, .. }
            | ToolCall::FetchFullCommitMessage { sha }
                if !is_commit_sha(sha) =>
            {
                Err(format!(
                    "`{name}` requires `sha` to be a commit hash of {MIN_SHA_LEN}-{MAX_SHA_LEN} \
                     hex characters, got {sha:?}"
                ))
            }
            ToolCall::FetchAuthorStats { author_name } if author_name.is_empty() => {
                Err(format!("`{name}` requires a non-empty `author_name`"))
            }
            _ => Ok(call),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::FetchFilteredDiff { .. } => FETCH_FILTERED_DIFF,
            ToolCall::FetchFullDiff { .. } => FETCH_FULL_DIFF,
            ToolCall::FetchFullCommitMessage { .. } => FETCH_FULL_COMMIT_MESSAGE,
            ToolCall::FetchAuthorStats { .. } => FETCH_AUTHOR_STATS,
        }
    }
}

// ── Outputs ──

/// Structured result returned to the model, serialized as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutput {
    Diff {
        sha: String,
        filtered: bool,
        size_bytes: u64,
        suppressed_lines: usize,
        diff: String,
    },
    CommitMessage {
        sha: String,
        author: String,
        email: String,
        date: String,
        message: String,
    },
    AuthorStats {
        author: String,
        commit_count: usize,
        first_commit: Option<String>,
        last_commit: Option<String>,
    },
    /// The run's diff budget is spent; summarize from messages instead.
    BudgetExhausted { reason: String },
    /// Rejected without charging the budget.
    DiffTooLarge {
        sha: String,
        size_bytes: u64,
        max_bytes: u64,
        message: String,
    },
    Error { tool: String, message: String },
}

impl ToolOutput {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutput::Error { .. })
    }

    pub fn to_content(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| json!({ "status": "error", "message": e.to_string() }).to_string())
    }

    fn failed(err: Error) -> Self {
        match err {
            Error::ToolExecution { tool, message } => ToolOutput::Error { tool, message },
            other => ToolOutput::Error {
                tool: String::new(),
                message: other.to_string(),
            },
        }
    }
}

// ── Declarations ──

/// Tool declarations sent to the model.
pub fn declarations() -> Vec<ToolDeclaration> {
    let sha_reason = json!({
        "type": "object",
        "properties": {
            "sha": {
                "type": "string",
                "description": "Commit SHA, 4 to 40 hex characters (full or abbreviated)."
            },
            "reason": { "type": "string", "description": "Why the message alone is not enough." }
        },
        "required": ["sha", "reason"]
    });
    vec![
        ToolDeclaration {
            name: FETCH_FILTERED_DIFF.into(),
            description: "Fetch a commit's diff with vendored and lock-file changes removed. \
                          Counts against the diff budget. Use only when the commit message is \
                          vague or its scope needs checking."
                .into(),
            input_schema: sha_reason.clone(),
        },
        ToolDeclaration {
            name: FETCH_FULL_DIFF.into(),
            description: "Fetch the complete, unfiltered diff. Counts against the diff budget. \
                          Use only after a filtered diff reported suppressed lines that matter."
                .into(),
            input_schema: sha_reason,
        },
        ToolDeclaration {
            name: FETCH_FULL_COMMIT_MESSAGE.into(),
            description: "Fetch the full author, date and untruncated message of a commit. \
                          Free; prefer it over a diff when a message was truncated."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": { "sha": { "type": "string" } },
                "required": ["sha"]
            }),
        },
        ToolDeclaration {
            name: FETCH_AUTHOR_STATS.into(),
            description: "Total commit count and first/last commit dates for an exact author \
                          name. Free."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": { "author_name": { "type": "string" } },
                "required": ["author_name"]
            }),
        },
    ]
}

// ── Gateway ──

/// Runs tool calls for one analysis run.
pub struct ToolGateway<'a> {
    vcs: &'a dyn VersionControl,
}

impl<'a> ToolGateway<'a> {
    pub fn new(vcs: &'a dyn VersionControl) -> Self {
        Self { vcs }
    }

    /// Invoke a tool by name. Only cancellation is returned as `Err`; every
    /// other failure becomes a [`ToolOutput`] the model can read.
    pub async fn invoke(
        &self,
        name: &str,
        input: &Value,
        budget: &mut BudgetTracker,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput> {
        let call = match ToolCall::parse(name, input) {
            Ok(call) => call,
            Err(message) => {
                warn!(tool = name, %message, "rejected tool call");
                return Ok(ToolOutput::Error {
                    tool: name.to_string(),
                    message,
                });
            }
        };
        debug!(tool = call.name(), "invoking tool");

        let output = match call {
            ToolCall::FetchFilteredDiff { sha, reason } => {
                self.fetch_diff(&sha, &reason, true, budget, cancel).await?
            }
            ToolCall::FetchFullDiff { sha, reason } => {
                self.fetch_diff(&sha, &reason, false, budget, cancel).await?
            }
            ToolCall::FetchFullCommitMessage { sha } => {
                let result = guard(cancel, async { Ok(self.vcs.commit_detail(&sha).await) }).await?;
                match result {
                    Ok(d) => ToolOutput::CommitMessage {
                        sha: d.sha,
                        author: d.author,
                        email: d.email,
                        date: saga_core::format_rfc3339(d.timestamp),
                        message: d.message,
                    },
                    Err(e) => ToolOutput::failed(tool_error(FETCH_FULL_COMMIT_MESSAGE, e)),
                }
            }
            ToolCall::FetchAuthorStats { author_name } => {
                let result =
                    guard(cancel, async { Ok(self.vcs.author_stats(&author_name).await) }).await?;
                match result {
                    Ok(s) => ToolOutput::AuthorStats {
                        author: s.author,
                        commit_count: s.commit_count,
                        first_commit: s.first_commit.map(saga_core::format_rfc3339),
                        last_commit: s.last_commit.map(saga_core::format_rfc3339),
                    },
                    Err(e) => ToolOutput::failed(tool_error(FETCH_AUTHOR_STATS, e)),
                }
            }
        };
        Ok(output)
    }

    async fn fetch_diff(
        &self,
        sha: &str,
        reason: &str,
        filtered: bool,
        budget: &mut BudgetTracker,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput> {
        let tool = if filtered { FETCH_FILTERED_DIFF } else { FETCH_FULL_DIFF };
        if let Err(reason) = budget.can_fetch_more() {
            info!(sha, %reason, "diff fetch denied");
            return Ok(ToolOutput::BudgetExhausted { reason });
        }

        let fetched = guard(cancel, async {
            Ok(if filtered {
                self.vcs.filtered_diff(sha).await.map(|f| (f.diff, f.suppressed_lines))
            } else {
                self.vcs.full_diff(sha).await.map(|d| (d, 0))
            })
        })
        .await?;
        let (diff, suppressed_lines) = match fetched {
            Ok(v) => v,
            Err(e) => return Ok(ToolOutput::failed(tool_error(tool, e))),
        };

        let size_bytes = diff.len() as u64;
        if !budget.fits_single_fetch(size_bytes) {
            let max_bytes = budget.limits().max_bytes_per_fetch;
            info!(sha, size_bytes, max_bytes, "diff too large");
            return Ok(ToolOutput::DiffTooLarge {
                sha: sha.to_string(),
                size_bytes,
                max_bytes,
                message: "diff exceeds the per-fetch size cap; treat this as a large change \
                          and describe it from the commit message"
                    .into(),
            });
        }
        if let Err(reason) = budget.try_record_fetch(sha, size_bytes, reason) {
            return Ok(ToolOutput::BudgetExhausted { reason });
        }
        debug!(sha, size_bytes, fetch_count = budget.fetch_count(), "diff fetched");
        Ok(ToolOutput::Diff {
            sha: sha.to_string(),
            filtered,
            size_bytes,
            suppressed_lines,
            diff,
        })
    }
}

fn tool_error(tool: &str, err: saga_git::GitError) -> Error {
    let err = Error::ToolExecution {
        tool: tool.to_string(),
        message: err.to_string(),
    };
    warn!(error = %err, "tool failed");
    err
}

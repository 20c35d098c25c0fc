use std::fmt::Write as _;

use saga_core::{BranchActivity, Commit};
use time::macros::format_description;

use crate::budget::BudgetLimits;
use crate::tools::FETCH_FULL_COMMIT_MESSAGE;

/// Everything the model is told about the commits under analysis.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub repo_name: &'a str,
    pub description: Option<&'a str>,
    pub branch: &'a str,
    /// Human label for the period, e.g. `week 2024-W10`.
    pub period: Option<&'a str>,
    pub commits: &'a [Commit],
    pub branch_activity: &'a [BranchActivity],
    pub previous_summary: Option<&'a str>,
}

impl<'a> PromptContext<'a> {
    pub fn new(repo_name: &'a str, branch: &'a str, commits: &'a [Commit]) -> Self {
        Self {
            repo_name,
            description: None,
            branch,
            period: None,
            commits,
            branch_activity: &[],
            previous_summary: None,
        }
    }
}

/// Render the user message. In agent mode truncated messages point at the
/// full-message tool.
pub fn build_prompt(
    ctx: &PromptContext<'_>,
    max_message_chars: usize,
    agent_mode: bool,
) -> String {
    let date_fmt = format_description!("[year]-[month]-[day]");
    let mut out = String::new();

    let _ = writeln!(out, "Repository: {}", ctx.repo_name);
    if let Some(desc) = ctx.description.filter(|d| !d.trim().is_empty()) {
        let _ = writeln!(out, "Description: {}", desc.trim());
    }
    let _ = writeln!(out, "Branch: {}", ctx.branch);
    if let Some(period) = ctx.period {
        let _ = writeln!(out, "Period: {period}");
    }

    let _ = writeln!(out, "\n## Commits ({}, newest first)\n", ctx.commits.len());
    for (i, c) in ctx.commits.iter().enumerate() {
        let date = c.timestamp.format(date_fmt).unwrap_or_default();
        let message = truncate_message(&c.message, max_message_chars, agent_mode);
        let _ = writeln!(out, "{}. {} | {} | {}", i + 1, c.short_sha(), c.author, date);
        for line in message.lines() {
            let _ = writeln!(out, "   {line}");
        }
    }

    if !ctx.branch_activity.is_empty() {
        let _ = writeln!(out, "\n## Other branch activity\n");
        for b in ctx.branch_activity {
            let authors: Vec<String> = b
                .authors
                .iter()
                .map(|(name, n)| format!("{name} ({n})"))
                .collect();
            let _ = writeln!(
                out,
                "- {}: {} commit(s) by {}",
                b.branch,
                b.commit_count,
                authors.join(", ")
            );
        }
    }

    if let Some(prev) = ctx.previous_summary.filter(|p| !p.trim().is_empty()) {
        let _ = writeln!(out, "\n## Previous period summary\n\n{}", prev.trim());
    }

    out
}

/// Cut `message` to `max_chars` characters, appending a marker when cut.
pub fn truncate_message(message: &str, max_chars: usize, agent_mode: bool) -> String {
    let message = message.trim_end();
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let mut cut: String = message.chars().take(max_chars).collect();
    if agent_mode {
        let _ = write!(
            cut,
            " [message truncated; call {FETCH_FULL_COMMIT_MESSAGE} for the full text]"
        );
    } else {
        cut.push_str(" [message truncated]");
    }
    cut
}

const SHARED_INSTRUCTIONS: &str = "\
You write concise engineering summaries of git history for a team.
Group related commits, describe what changed and why it matters, and name
contributors where useful. Do not invent changes that the commits do not show.";

/// System instructions for the single-shot mode.
pub fn simple_instructions() -> String {
    format!("{SHARED_INSTRUCTIONS}\n\nAnswer with the summary only.")
}

/// System instructions for tool-calling mode, including the fetch policy.
pub fn agent_instructions(limits: &BudgetLimits) -> String {
    format!(
        "{SHARED_INSTRUCTIONS}

You can request more context with tools. Follow this policy:
- Summarize from commit messages alone when they are self-descriptive.
- Fetch a diff only when a message is vague or ambiguous, references something
  unexplained, or when you need to verify the scope of a change.
- When a message was truncated, call {FETCH_FULL_COMMIT_MESSAGE} before any diff fetch.
- Prefer fetch_filtered_diff; use fetch_full_diff only if the filtered diff reported
  suppressed lines that matter.
- You may fetch at most {} diffs of up to {} bytes each in this run.
- If the diff budget runs out, summarize the remaining commits from their messages
  and say in the summary that some commits were not inspected in detail.

When you are done, reply with the final summary and no tool calls.",
        limits.max_fetches, limits.max_bytes_per_fetch
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use time::macros::datetime;

    fn commit(sha: &str, author: &str, message: &str) -> Commit {
        Commit {
            sha: sha.into(),
            author: author.into(),
            timestamp: datetime!(2024-03-05 10:00 UTC),
            message: message.into(),
        }
    }

    #[test]
    fn truncation_marks_and_respects_char_boundaries() {
        assert_eq!(truncate_message("short", 10, true), "short");
        let t = truncate_message("héllo wörld", 5, true);
        assert!(t.starts_with("héllo [message truncated"));
        assert!(t.contains(FETCH_FULL_COMMIT_MESSAGE));
        let t = truncate_message("héllo wörld", 5, false);
        assert_eq!(t, "héllo [message truncated]");
    }

    #[test]
    fn prompt_lists_commits_and_optional_sections() {
        let commits = vec![
            commit("aaaaaaaaaaaa", "Ana", "Fix null pointer in auth"),
            commit("bbbbbbbbbbbb", "Bo", "fix"),
        ];
        let mut authors = BTreeMap::new();
        authors.insert("Cy".to_string(), 2);
        let activity = vec![BranchActivity {
            branch: "feat/search".into(),
            commit_count: 2,
            authors,
        }];
        let ctx = PromptContext {
            description: Some("Payments API"),
            period: Some("week 2024-W10"),
            branch_activity: &activity,
            previous_summary: Some("Last week: login rewrite."),
            ..PromptContext::new("pay", "main", &commits)
        };
        let p = build_prompt(&ctx, 500, true);
        assert!(p.contains("Repository: pay"));
        assert!(p.contains("Description: Payments API"));
        assert!(p.contains("Period: week 2024-W10"));
        assert!(p.contains("1. aaaaaaa | Ana | 2024-03-05"));
        assert!(p.contains("2. bbbbbbb | Bo | 2024-03-05"));
        assert!(p.contains("- feat/search: 2 commit(s) by Cy (2)"));
        assert!(p.contains("## Previous period summary\n\nLast week: login rewrite."));
    }

    #[test]
    fn prompt_omits_empty_sections() {
        let commits = vec![commit("aaaaaaaaaaaa", "Ana", "x")];
        let p = build_prompt(&PromptContext::new("pay", "main", &commits), 500, false);
        assert!(!p.contains("Description"));
        assert!(!p.contains("Other branch activity"));
        assert!(!p.contains("Previous period"));
    }

    #[test]
    fn agent_instructions_state_limits() {
        let s = agent_instructions(&BudgetLimits {
            max_fetches: 3,
            max_bytes_per_fetch: 50_000,
            max_tokens: 40_000,
        });
        assert!(s.contains("at most 3 diffs of up to 50000 bytes"));
        assert!(s.contains(FETCH_FULL_COMMIT_MESSAGE));
    }
}

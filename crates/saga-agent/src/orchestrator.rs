//! Drives one analysis: a single prompt, then a sequential model/tool loop.

use saga_core::cancel::guard;
use saga_core::config::AgentConfig;
use saga_core::{BudgetMetadata, Error, Result};
use saga_git::VersionControl;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{Message, TextGenerator, ToolResult};
use crate::budget::{BudgetLimits, BudgetTracker};
use crate::prompt::{agent_instructions, build_prompt, simple_instructions, PromptContext};
use crate::tools::{declarations, ToolGateway};

// ── States ──

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Prompting,
    AwaitingModel,
    ExecutingTool,
    Done,
    Failed,
}

const VALID_TRANSITIONS: &[(AgentState, &[AgentState])] = &[
    (AgentState::Prompting, &[AgentState::AwaitingModel]),
    (
        AgentState::AwaitingModel,
        &[AgentState::ExecutingTool, AgentState::Done, AgentState::Failed],
    ),
    (
        AgentState::ExecutingTool,
        &[AgentState::AwaitingModel, AgentState::Failed],
    ),
    // Done and Failed are terminal
];

fn is_valid_transition(from: AgentState, to: AgentState) -> bool {
    VALID_TRANSITIONS
        .iter()
        .any(|(f, targets)| *f == from && targets.contains(&to))
}

/// State of one run, advanced only along [`VALID_TRANSITIONS`].
#[derive(Debug)]
struct RunState {
    state: AgentState,
    turns: u32,
    tool_calls: u32,
    fragments: Vec<String>,
}

impl RunState {
    fn new() -> Self {
        Self {
            state: AgentState::Prompting,
            turns: 0,
            tool_calls: 0,
            fragments: Vec::new(),
        }
    }

    fn advance(&mut self, to: AgentState) -> Result<()> {
        if !is_valid_transition(self.state, to) {
            return Err(Error::Model(format!(
                "invalid agent transition: {:?} → {to:?}",
                self.state
            )));
        }
        debug!(from = ?self.state, to = ?to, "agent transition");
        self.state = to;
        Ok(())
    }

    /// Move to `Failed` and hand back `err`.
    fn fail<T>(&mut self, err: Error) -> Result<T> {
        if is_valid_transition(self.state, AgentState::Failed) {
            self.state = AgentState::Failed;
        }
        warn!(error = %err, turns = self.turns, "analysis run failed");
        Err(err)
    }

    fn summary(&self) -> String {
        self.fragments
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

// ── Output ──

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisOutput {
    pub summary: String,
    pub agent_mode: bool,
    /// Absent in single-shot mode.
    pub budget: Option<BudgetMetadata>,
    pub turns: u32,
    pub tool_calls: u32,
}

// ── Orchestrator ──

pub struct Orchestrator<'a> {
    generator: &'a dyn TextGenerator,
    vcs: &'a dyn VersionControl,
    config: &'a AgentConfig,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        generator: &'a dyn TextGenerator,
        vcs: &'a dyn VersionControl,
        config: &'a AgentConfig,
    ) -> Self {
        Self {
            generator,
            vcs,
            config,
        }
    }

    /// Summarize the commits in `ctx`. Agent mode when enabled in config,
    /// single-shot otherwise.
    pub async fn run(
        &self,
        ctx: &PromptContext<'_>,
        cancel: &CancellationToken,
    ) -> Result<AnalysisOutput> {
        if self.config.enabled {
            self.run_agent(ctx, cancel).await
        } else {
            self.run_simple(ctx, cancel).await
        }
    }

    /// One text-generation call, no tools and no budget.
    pub async fn run_simple(
        &self,
        ctx: &PromptContext<'_>,
        cancel: &CancellationToken,
    ) -> Result<AnalysisOutput> {
        let prompt = build_prompt(ctx, self.config.max_message_chars, false);
        let system = simple_instructions();
        info!(repo = ctx.repo_name, commits = ctx.commits.len(), "single-shot analysis");
        let text = guard(cancel, self.generator.generate(&system, &prompt)).await?;
        let summary = text.trim().to_string();
        if summary.is_empty() {
            return Err(Error::Model("model returned an empty summary".into()));
        }
        Ok(AnalysisOutput {
            summary,
            agent_mode: false,
            budget: None,
            turns: 1,
            tool_calls: 0,
        })
    }

    /// Tool-calling loop under a fresh [`BudgetTracker`].
    pub async fn run_agent(
        &self,
        ctx: &PromptContext<'_>,
        cancel: &CancellationToken,
    ) -> Result<AnalysisOutput> {
        let limits = BudgetLimits::from_config(self.config);
        let mut budget = BudgetTracker::new(limits);
        let gateway = ToolGateway::new(self.vcs);
        let tools = declarations();
        let system = agent_instructions(&limits);
        let mut messages = vec![Message::User(build_prompt(
            ctx,
            self.config.max_message_chars,
            true,
        ))];
        let mut run = RunState::new();
        info!(repo = ctx.repo_name, commits = ctx.commits.len(), "agent analysis");

        run.advance(AgentState::AwaitingModel)?;
        loop {
            let next = self.generator.next_turn(&system, &tools, &messages);
            let turn = match guard(cancel, next).await {
                Ok(turn) => turn,
                Err(e) => return run.fail(e),
            };
            run.turns += 1;
            run.fragments.extend(turn.texts.iter().cloned());
            messages.push(Message::Assistant {
                texts: turn.texts.clone(),
                tool_calls: turn.tool_calls.clone(),
            });

            if turn.is_final() {
                run.advance(AgentState::Done)?;
                break;
            }

            run.advance(AgentState::ExecutingTool)?;
            let mut results = Vec::with_capacity(turn.tool_calls.len());
            for call in &turn.tool_calls {
                let invoked = gateway
                    .invoke(&call.name, &call.input, &mut budget, cancel)
                    .await;
                let output = match invoked {
                    Ok(output) => output,
                    Err(e) => return run.fail(e),
                };
                run.tool_calls += 1;
                results.push(ToolResult {
                    id: call.id.clone(),
                    content: output.to_content(),
                    is_error: output.is_error(),
                });
            }
            messages.push(Message::ToolResults(results));

            if run.turns >= self.config.max_turns {
                return run.fail(Error::TurnLimit(self.config.max_turns));
            }
            run.advance(AgentState::AwaitingModel)?;
        }

        let summary = run.summary();
        if summary.is_empty() {
            return Err(Error::Model("model returned an empty summary".into()));
        }
        let budget = budget.snapshot();
        info!(
            turns = run.turns,
            tool_calls = run.tool_calls,
            fetch_count = budget.fetch_count,
            estimated_tokens = budget.estimated_tokens,
            "agent analysis complete"
        );
        Ok(AnalysisOutput {
            summary,
            agent_mode: true,
            budget: Some(budget),
            turns: run.turns,
            tool_calls: run.tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ModelTurn, ScriptedGenerator};
    use crate::tools::{FETCH_AUTHOR_STATS, FETCH_FILTERED_DIFF};
    use saga_core::Commit;
    use saga_git::MockVcs;
    use serde_json::json;
    use time::macros::datetime;

    const FIX_DIFF: &str = "diff --git a/src/auth/session.rs b/src/auth/session.rs\n\
--- a/src/auth/session.rs\n+++ b/src/auth/session.rs\n@@ -40 +40 @@\n\
-    if token.len() > 0 {\n+    if !token.is_empty() && !token.expired() {\n";

    fn scenario() -> (MockVcs, Vec<Commit>) {
        let commits = vec![
            Commit {
                sha: "c3c3c3c3c3".into(),
                author: "Cy".into(),
                timestamp: datetime!(2024-03-06 9:00 UTC),
                message: "update deps".into(),
            },
            Commit {
                sha: "b2b2b2b2b2".into(),
                author: "Bo".into(),
                timestamp: datetime!(2024-03-05 9:00 UTC),
                message: "fix".into(),
            },
            Commit {
                sha: "a1a1a1a1a1".into(),
                author: "Ana".into(),
                timestamp: datetime!(2024-03-04 9:00 UTC),
                message: "Fix null pointer in auth".into(),
            },
        ];
        let vcs = commits
            .iter()
            .cloned()
            .fold(MockVcs::new(), |v, c| v.with_commit(c))
            .with_diff("b2b2b2b2b2", FIX_DIFF)
            .with_diff("c3c3c3c3c3", "diff --git a/Cargo.lock b/Cargo.lock\n-a\n+b\n");
        (vcs, commits)
    }

    fn config(max_diff_fetches: u32) -> AgentConfig {
        AgentConfig {
            max_diff_fetches,
            ..AgentConfig::default()
        }
    }

    #[test]
    fn transitions_follow_table() {
        use AgentState::*;
        assert!(is_valid_transition(Prompting, AwaitingModel));
        assert!(is_valid_transition(AwaitingModel, ExecutingTool));
        assert!(is_valid_transition(ExecutingTool, AwaitingModel));
        assert!(!is_valid_transition(Prompting, Done));
        assert!(!is_valid_transition(Done, AwaitingModel));
        assert!(!is_valid_transition(Failed, AwaitingModel));

        let mut run = RunState::new();
        assert!(run.advance(Done).is_err());
        run.advance(AwaitingModel).unwrap();
        run.advance(Done).unwrap();
    }

    #[tokio::test]
    async fn vague_commit_gets_one_diff_and_budget_holds() {
        let (vcs, commits) = scenario();
        let generator = ScriptedGenerator::new()
            .with_turn(
                ModelTurn::text("The \"fix\" commit is vague; checking its diff.").with_tool(
                    "t1",
                    FETCH_FILTERED_DIFF,
                    json!({"sha": "b2b2b2b2b2", "reason": "message is vague"}),
                ),
            )
            .with_turn(ModelTurn::tool(
                "t2",
                FETCH_FILTERED_DIFF,
                json!({"sha": "c3c3c3c3c3", "reason": "verify scope"}),
            ))
            .with_turn(ModelTurn::text(
                "Ana fixed a null pointer in auth. Bo hardened session token validation \
                 to reject expired tokens. Cy updated dependencies. Some commits were not \
                 inspected in detail because the diff budget was exhausted.",
            ));
        let cfg = config(1);
        let orch = Orchestrator::new(&generator, &vcs, &cfg);
        let ctx = PromptContext::new("pay", "main", &commits);

        let out = orch.run(&ctx, &CancellationToken::new()).await.unwrap();

        assert!(out.agent_mode);
        assert_eq!(out.turns, 3);
        assert_eq!(out.tool_calls, 2);
        let budget = out.budget.unwrap();
        assert_eq!(budget.fetch_count, 1);
        assert_eq!(budget.fetch_log[0].sha, "b2b2b2b2b2");
        assert!(out.summary.starts_with("The \"fix\" commit is vague"));
        assert!(out.summary.contains("expired tokens"));

        let requests = generator.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].tool_names.len(), 4);
        assert!(requests[0].system.contains("at most 1 diffs"));
        // First tool result carries the diff; the second is a budget denial.
        match requests[1].messages.last() {
            Some(Message::ToolResults(r)) => {
                assert_eq!(r[0].id, "t1");
                assert!(r[0].content.contains("token.expired()"));
                assert!(!r[0].is_error);
            }
            other => panic!("unexpected {other:?}"),
        }
        match requests[2].messages.last() {
            Some(Message::ToolResults(r)) => {
                assert!(r[0].content.contains("budget_exhausted"));
                assert!(!r[0].is_error);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            vcs.calls().iter().filter(|c| c.starts_with("filtered_diff")).count(),
            1
        );
    }

    #[tokio::test]
    async fn tool_failure_does_not_abort() {
        let (vcs, commits) = scenario();
        let generator = ScriptedGenerator::new()
            .with_turn(ModelTurn::tool("t1", "drop_database", json!({})))
            .with_turn(ModelTurn::text("Summary from messages."));
        let cfg = config(5);
        let out = Orchestrator::new(&generator, &vcs, &cfg)
            .run(&PromptContext::new("pay", "main", &commits), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.summary, "Summary from messages.");
        match generator.requests()[1].messages.last() {
            Some(Message::ToolResults(r)) => assert!(r[0].is_error),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn model_failure_aborts_run() {
        let (vcs, commits) = scenario();
        let generator = ScriptedGenerator::new()
            .with_turn(ModelTurn::tool("t1", FETCH_AUTHOR_STATS, json!({"author_name": "Bo"})))
            .with_turn_error(Error::Model("503 overloaded".into()));
        let cfg = config(5);
        let err = Orchestrator::new(&generator, &vcs, &cfg)
            .run(&PromptContext::new("pay", "main", &commits), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Model(m) if m.contains("503")));
    }

    #[tokio::test]
    async fn turn_limit_stops_tool_loop() {
        let (vcs, commits) = scenario();
        let mut generator = ScriptedGenerator::new();
        for i in 0..3 {
            generator = generator.with_turn(ModelTurn::tool(
                &format!("t{i}"),
                FETCH_AUTHOR_STATS,
                json!({"author_name": "Bo"}),
            ));
        }
        let cfg = AgentConfig {
            max_turns: 2,
            ..AgentConfig::default()
        };
        let err = Orchestrator::new(&generator, &vcs, &cfg)
            .run(&PromptContext::new("pay", "main", &commits), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TurnLimit(2)));
        assert_eq!(generator.remaining_turns(), 1);
    }

    #[tokio::test]
    async fn simple_mode_uses_no_tools_or_budget() {
        let (vcs, commits) = scenario();
        let generator = ScriptedGenerator::new().with_completion("  Three small changes.  ");
        let cfg = AgentConfig {
            enabled: false,
            ..AgentConfig::default()
        };
        let out = Orchestrator::new(&generator, &vcs, &cfg)
            .run(&PromptContext::new("pay", "main", &commits), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!out.agent_mode);
        assert_eq!(out.summary, "Three small changes.");
        assert!(out.budget.is_none());
        assert!(generator.requests()[0].tool_names.is_empty());
        assert!(vcs.calls().is_empty());
    }

    #[tokio::test]
    async fn cancelled_run_returns_error() {
        let (vcs, commits) = scenario();
        let generator = ScriptedGenerator::new().with_turn(ModelTurn::text("never"));
        let cfg = config(5);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = Orchestrator::new(&generator, &vcs, &cfg)
            .run(&PromptContext::new("pay", "main", &commits), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(generator.requests().is_empty());
    }
}

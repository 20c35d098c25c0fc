use std::path::Path;

use saga_report::{Analyzer, RangeOutcome};
use tokio_util::sync::CancellationToken;

use crate::workspace::Workspace;

/// `saga analyze`
pub async fn execute(cwd: &Path, cancel: CancellationToken) -> anyhow::Result<()> {
    let (ws, generator) = Workspace::open_with_model(cwd)?;
    let analyzer = Analyzer::new(&ws.store, &ws.vcs, &generator, &ws.config);

    match analyzer.analyze_new_commits(&ws.repo, &cancel).await? {
        RangeOutcome::UpToDate { head } => {
            println!("{} is up to date at {}", ws.repo.name, short(&head));
        }
        RangeOutcome::Analyzed {
            run_id,
            head,
            commit_count,
            truncated,
            output,
        } => {
            println!("{}", output.summary);
            println!();
            let mut line = format!(
                "{run_id}: {commit_count} commit(s) through {}",
                short(&head)
            );
            if truncated {
                line.push_str(&format!(
                    " (first run, limited to the newest {})",
                    ws.config.analysis.max_commits
                ));
            }
            if let Some(budget) = &output.budget {
                line.push_str(&format!(
                    ", {} diff fetch(es), ~{} tokens",
                    budget.fetch_count, budget.estimated_tokens
                ));
            }
            println!("{line}");
        }
    }
    Ok(())
}

fn short(sha: &str) -> &str {
    &sha[..sha.len().min(7)]
}

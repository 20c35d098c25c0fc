use std::path::Path;

use anyhow::Context;
use saga_core::iso_week::IsoWeek;
use saga_core::WeeklyReport;
use saga_report::{ReportEngine, WeekOutcome};
use saga_store::ReportStore;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tokio_util::sync::CancellationToken;

use crate::workspace::Workspace;

/// `saga week <YYYY-Www> [--force]`
pub async fn week(
    cwd: &Path,
    label: &str,
    force: bool,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let week = IsoWeek::parse(label)?;
    week.bounds()?;
    let (ws, generator) = Workspace::open_with_model(cwd)?;
    let engine = ReportEngine::new(&ws.store, &ws.vcs, &generator, &ws.config);

    let outcome = engine.generate_week(&ws.repo, week, force, &cancel).await?;
    match &outcome {
        WeekOutcome::Generated(r) | WeekOutcome::Regenerated(r) => {
            println!("{}", r.summary);
            println!();
            println!("{week}: {} ({} commit(s))", outcome.label(), r.commit_count);
        }
        WeekOutcome::Skipped => {
            println!("{week}: report exists (use --force to regenerate)");
        }
        WeekOutcome::NoCommits => println!("{week}: no commits"),
    }
    Ok(())
}

/// `saga backfill --since <YYYY-MM-DD> [--force]`
pub async fn backfill(
    cwd: &Path,
    since: &str,
    force: bool,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let since = parse_date(since)?;
    let today = OffsetDateTime::now_utc().date();
    if since > today {
        anyhow::bail!("--since {since} is in the future");
    }
    let (ws, generator) = Workspace::open_with_model(cwd)?;
    let engine = ReportEngine::new(&ws.store, &ws.vcs, &generator, &ws.config);

    let s = engine
        .backfill(&ws.repo, since, today, force, &cancel)
        .await?;
    println!(
        "{} week(s): {} generated, {} regenerated, {} skipped, {} without commits, {} failed",
        s.weeks(),
        s.generated,
        s.regenerated,
        s.skipped,
        s.no_commits,
        s.failed
    );
    for f in &s.failures {
        println!("  {}: {}", f.week, f.error);
    }
    Ok(())
}

/// `saga reports [--limit N] [--json]`
pub fn list(cwd: &Path, limit: usize, json: bool) -> anyhow::Result<()> {
    let ws = Workspace::open(cwd)?;
    let reports = ws.store.list_reports(ws.repo.id, Some(limit))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }
    if reports.is_empty() {
        println!(
            "No reports in {}. Run `saga week <YYYY-Www>` or `saga backfill`.",
            ws.paths.db_file.display()
        );
        return Ok(());
    }
    for r in &reports {
        println!("{}", format_report(r));
    }
    Ok(())
}

fn parse_date(s: &str) -> anyhow::Result<Date> {
    Date::parse(s, format_description!("[year]-[month]-[day]"))
        .with_context(|| format!("invalid date {s:?}, expected YYYY-MM-DD"))
}

fn format_report(r: &WeeklyReport) -> String {
    let label = IsoWeek { year: r.year, week: r.week }.label();
    let mode = if r.agent_mode { "agent" } else { "simple" };
    let first_line = r.summary.lines().next().unwrap_or("").trim();
    format!(
        "{label}  {:>3} commit(s)  {:<6}  {}",
        r.commit_count, mode, first_line
    )
}

mod cmd_analyze;
mod cmd_config;
mod cmd_report;
mod workspace;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "saga", version, about = "Budget-aware summaries of git history")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize commits added since the last analysis
    Analyze,
    /// Generate the report for one ISO week
    Week {
        /// Week label, e.g. 2024-W07
        week: String,
        /// Overwrite an existing report
        #[arg(long)]
        force: bool,
    },
    /// Generate reports for every week from a date through today
    Backfill {
        /// First day to cover (YYYY-MM-DD)
        #[arg(long)]
        since: String,
        /// Overwrite existing reports
        #[arg(long)]
        force: bool,
    },
    /// List stored weekly reports, newest first
    Reports {
        /// Maximum reports to show
        #[arg(long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage .saga/config.json
    Config {
        #[command(subcommand)]
        cmd: cmd_config::ConfigCmd,
    },
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;

    match cli.cmd {
        Command::Analyze => with_runtime(|cancel| cmd_analyze::execute(&cwd, cancel)),
        Command::Week { week, force } => {
            with_runtime(|cancel| cmd_report::week(&cwd, &week, force, cancel))
        }
        Command::Backfill { since, force } => {
            with_runtime(|cancel| cmd_report::backfill(&cwd, &since, force, cancel))
        }
        Command::Reports { limit, json } => cmd_report::list(&cwd, limit, json),
        Command::Config { cmd } => cmd_config::run(cmd, &cwd),
    }
}

/// `SAGA_LOG`, then `RUST_LOG`, then `info`; always to stderr.
fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let filter = std::env::var("SAGA_LOG")
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Run an async command on a fresh runtime, cancelling it on Ctrl+C.
fn with_runtime<F, Fut>(f: F) -> anyhow::Result<()>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<()>>,
{
    let cancel = CancellationToken::new();
    let handler = cancel.clone();
    let _ = ctrlc::set_handler(move || {
        eprintln!("\ncancelling...");
        handler.cancel();
    });
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(f(cancel))
}

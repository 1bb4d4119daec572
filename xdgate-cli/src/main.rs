//! xdgate CLI: launches continual-learning experiments on one device.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use xdgate_core::{
    DryRunTrainer, Interrupts, Launcher, NetworkVariant, PythonTrainer, RunOutcome, Scenario,
    Trainer, load_config,
};

/// xdgate: synaptic intelligence + context-dependent gating experiment launcher
#[derive(Parser, Debug)]
#[command(name = "xdgate", version, about, long_about = None)]
struct Cli {
    /// Device identifier forwarded to the trainer (e.g. a GPU index)
    device_id: String,

    /// Scenario to run: mnist, colored-mnist, imagenet, cifar
    #[arg(short, long, default_value = "colored-mnist")]
    scenario: Scenario,

    /// Network variant: standard, multihead, split
    #[arg(long, default_value = "standard")]
    variant: NetworkVariant,

    /// Configuration file path (defaults to ./xdgate.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write merged parameters instead of training
    #[arg(long)]
    dry_run: bool,

    /// Print the run plan as JSON and exit
    #[arg(long)]
    plan: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,
}

/// Human-readable stderr plus daily JSON log files.
fn init_tracing(verbose: u8, quiet: bool) -> Option<WorkerGuard> {
    let filter = match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "xdgate", "xdgate")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    if std::fs::create_dir_all(&log_dir).is_err() {
        tracing_subscriber::registry().with(stderr_layer).init();
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(&log_dir, "xdgate.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();
    Some(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.verbose, cli.quiet);

    let workspace = std::env::current_dir()?;
    let config = load_config(Some(&workspace), cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let plan = cli.scenario.plan(cli.variant)?;
    if cli.plan {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let trainer: Arc<dyn Trainer> = if cli.dry_run {
        Arc::new(DryRunTrainer)
    } else {
        Arc::new(PythonTrainer::from_config(&config.python))
    };

    let interrupts = Interrupts::new();
    let listener = interrupts.listen_for_ctrl_c();

    let mut launcher = Launcher::from_config(trainer, Some(cli.device_id), &config)?
        .with_interrupts(interrupts);
    let result = launcher.run(&plan).await;
    listener.abort();

    let outcomes = result?;
    let cancelled = outcomes
        .iter()
        .filter(|o| matches!(o, RunOutcome::Cancelled))
        .count();
    info!(
        scenario = %cli.scenario,
        runs = outcomes.len(),
        cancelled,
        "Scenario finished"
    );
    Ok(())
}

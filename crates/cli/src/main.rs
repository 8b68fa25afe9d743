//! pdfharvest - bulk PDF downloader

mod args;

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pdfharvest_core::{
    load_config, load_env_config, validate_config, Orchestrator, OrchestratorState, RunSummary,
};

use args::Cli;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            load_config(path).with_context(|| format!("Failed to load config from {:?}", path))?
        }
        None => load_env_config().context("Failed to load configuration")?,
    };
    cli.apply(&mut config);
    validate_config(&config).context("Invalid configuration")?;

    let orchestrator = Orchestrator::from_config(config).context("Failed to build fetcher")?;

    let abort = orchestrator.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight downloads");
            abort.abort();
        }
    });

    let mut progress = orchestrator.subscribe();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(10));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let snapshot = progress.borrow_and_update().clone();
            if snapshot.state.is_terminal() {
                break;
            }
            info!(
                state = %snapshot.state,
                done = snapshot.done,
                failed = snapshot.failed,
                skipped = snapshot.skipped_already_done,
                total = snapshot.total_input,
                shards = snapshot.shards_written,
                "Progress"
            );
        }
    });

    let summary = orchestrator.run().await.context("Run could not start")?;
    print_summary(&summary)?;

    Ok(match summary.state {
        OrchestratorState::Done => ExitCode::SUCCESS,
        OrchestratorState::Aborted => ExitCode::from(130),
        _ => ExitCode::FAILURE,
    })
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn print_summary(summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("Failed to render summary")?;
    println!("{}", json);
    if summary.failed > 0 {
        eprintln!(
            "{} records failed, see {}",
            summary.failed,
            summary.error_log.display()
        );
    }
    Ok(())
}

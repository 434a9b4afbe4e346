use anyhow::Context;
use clap::Parser;
use news_collector::{Aggregator, CollectionOutcome, CollectorConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit status when the pass produced no items, so schedulers can skip publishing.
const EXIT_EMPTY: u8 = 3;

#[derive(Debug, Parser)]
#[command(name = "news-collector", about = "Run one news collection pass and print the items as JSON")]
struct Args {
    /// Source configuration file
    #[arg(long, env = "NEWS_SOURCES_CONFIG", default_value = "config/news_sources.json")]
    config: PathBuf,

    /// Write items here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Abort the pass after this many seconds, keeping items already collected
    #[arg(long)]
    deadline_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()).await {
        Ok(outcome) if outcome.is_empty() => ExitCode::from(EXIT_EMPTY),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("news-collector failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<CollectionOutcome> {
    let mut config = CollectorConfig::load(&args.config)?;
    if args.deadline_secs.is_some() {
        config.pass_deadline_secs = args.deadline_secs;
    }

    info!("Starting collection pass over {} sources", config.sources.len());
    let aggregator = Aggregator::new(config).context("building HTTP client")?;
    let outcome = aggregator.collect_all().await;

    for report in outcome.reports() {
        if let Some(err) = &report.error {
            warn!("{} ({}) failed: {}", report.name, report.kind, err);
        }
    }

    let json = serde_json::to_string_pretty(outcome.items())?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json + "\n")
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Wrote {} items to {}", outcome.items().len(), path.display());
        }
        None => println!("{}", json),
    }

    if let CollectionOutcome::Empty { .. } = outcome {
        warn!("Collection pass produced no items; nothing to publish");
    }
    Ok(outcome)
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use metricwatch::{logging, Agent, Settings};

const DEFAULT_CONFIG: &str = "metricwatch.toml";

#[derive(Parser, Debug)]
#[command(name = "metricwatch")]
#[command(about = "Metrics collection agent with live module reloading")]
struct Args {
    /// Path to the config file [default: metricwatch.toml, optional]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter directive (e.g. "debug", "metricwatch_sdk=trace")
    #[arg(short, long)]
    log_level: Option<String>,

    /// Run one fetch round, then exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // An explicit --config must exist; the default may be absent.
    let (path, required) = match args.config {
        Some(path) => (path, true),
        None => (PathBuf::from(DEFAULT_CONFIG), false),
    };
    let settings = Settings::load(&path, required)
        .with_context(|| format!("failed to load config from {}", path.display()))?;

    let directive = args.log_level.as_deref().unwrap_or(&settings.logging.level);
    logging::init(directive);

    info!(config = %path.display(), "starting metricwatch");

    let mut agent = Agent::new(settings)?;
    agent.start().await.context("failed to start agent")?;

    if args.once {
        // The first fetch of every metricset fires immediately.
        tokio::time::sleep(agent.longest_period()).await;
    } else {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")?;
        info!("shutdown requested");
    }

    agent.stop().await;
    Ok(())
}

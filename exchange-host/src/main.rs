use anyhow::{Context, Result};
use clap::Parser;
use exchange_host::{run, Args, HostConfig};
use std::str::FromStr;
use tokio::io::BufReader;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = Level::from_str(&args.log_level)
        .with_context(|| format!("invalid log level {:?}", args.log_level))?;
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = HostConfig::from_args(&args)
        .await
        .context("failed to load configuration")?;
    info!(
        participants = config.roster.len(),
        auto = config.auto,
        seed = ?config.seed,
        "starting gift exchange"
    );

    let (assignments, _) = run(
        config,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await?;
    info!(assignments = assignments.len(), "gift exchange finished");
    Ok(())
}

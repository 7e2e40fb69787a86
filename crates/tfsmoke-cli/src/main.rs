mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .init();
    }

    match cli.command {
        Command::Run { config, regions, json } => commands::run(config, regions, json).await,
        Command::Regions { regions, json } => commands::regions(regions, json).await,
        Command::Zones { region, json } => commands::zones(region, json).await,
        Command::DescribeCluster { region, name, json } => {
            commands::describe_cluster(region, name, json).await
        }
    }
}

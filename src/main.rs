mod analysis;
mod cli;
mod config;
mod error;
mod explore_mode;
mod filter;
mod info_mode;
mod loader;
mod normalize;
mod report;
mod structures;
mod writer;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info(args) => {
            info_mode::run_info(args)?;
        }
        Commands::Explore(args) => {
            let outcome = explore_mode::run_explore(args)?;
            info!(
                stats_rows = outcome.stats_rows,
                map_features = outcome.map_features,
                "explore completed"
            );
            for artifact in &outcome.artifacts {
                println!("{}", artifact.display());
            }
        }
    }

    Ok(())
}

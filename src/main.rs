mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use heirloom::config::HeirloomConfig;

#[derive(Parser)]
#[command(name = "heirloom", version, about = "Memorial diary chat service")]
struct Cli {
    /// Config file (defaults to ~/.heirloom/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server
    Serve,
    /// Re-embed all memorials and replace the semantic index
    RebuildIndex,
    /// Geocode memorials that have coordinates but no place name
    UpdateLocation,
    /// Print the first stored index snapshots
    InspectIndex {
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Print the family address terms for a user
    Family { family_id: i64, user_id: i64 },
    /// Check database and index health
    Doctor,
    /// Apply pending schema migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => HeirloomConfig::load_from(path)?,
        None => HeirloomConfig::load()?,
    };

    let filter =
        EnvFilter::try_new(&config.server.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => heirloom::server::serve(config).await?,
        Command::RebuildIndex => cli::rebuild_index(&config).await?,
        Command::UpdateLocation => cli::update_location(&config).await?,
        Command::InspectIndex { limit } => cli::inspect::inspect_index(&config, limit)?,
        Command::Family { family_id, user_id } => {
            cli::family(&config, family_id, user_id).await?
        }
        Command::Doctor => cli::doctor::doctor(&config)?,
        Command::Migrate => cli::migrate(&config)?,
    }

    Ok(())
}

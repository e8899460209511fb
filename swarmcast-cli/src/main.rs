//! Swarmcast CLI - Command-line interface
//!
//! Runs the API and streaming servers, or talks to a running API server.

mod commands;

use clap::Parser;

#[derive(Parser)]
#[command(name = "swarmcast")]
#[command(about = "Stream media out of a swarm while it downloads")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::handle_command(cli.command).await
}

//! Raven CLI entry point

use anyhow::Context;
use clap::Parser;
use raven::cli::commands::{self, decompose, emit, loop_cmd, merge, scatter, shred, validate};
use raven::cli::{Cli, Commands};
use raven::infrastructure::config::ConfigLoader;
use raven::infrastructure::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path).context("failed to load configuration")?,
        None => ConfigLoader::load().context("failed to load configuration")?,
    };

    let _logger_guard = logging::init(&config).context("failed to initialize logging")?;
    let cancel = commands::cancel_on_ctrl_c();

    let code = match cli.command {
        Commands::Decompose(args) => decompose::execute(args, &config, cli.json, &cancel).await?,
        Commands::Shred(args) => shred::execute(args, &config, cli.json, &cancel).await?,
        Commands::Scatter(args) => scatter::execute(args, &config, cli.json, &cancel).await?,
        Commands::Merge(args) => merge::execute(args, cli.json).await.map(|()| commands::EXIT_OK)?,
        Commands::Emit(args) => emit::execute(args, cli.json).await.map(|()| commands::EXIT_OK)?,
        Commands::Validate(args) => validate::execute(args, cli.json).await.map(|()| commands::EXIT_OK)?,
        Commands::Loop(args) => loop_cmd::execute(args.mode, &config, cli.json, &cancel).await?,
    };

    std::process::exit(code);
}

//! pagewatch CLI - detect meaningful changes in web pages
//!
//! Parses arguments, layers configuration (file, environment, flags) and
//! hands off to the command implementations.

use anyhow::{Context, Result};
use clap::Parser;
use pagewatch_core::Config;
use tracing::debug;

mod cli;
mod commands;
mod logging;
mod output;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::initialize_logging(&cli)?;

    let config = load_config(&cli)?;
    debug!(?config, "effective configuration");

    if cli.history {
        return commands::show_history(&cli.url, &config, cli.format);
    }

    commands::check_url(&cli.url, &config, cli.format).await
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config
        .apply_env_overrides()
        .context("Invalid environment override")?;
    cli.apply_to(&mut config);
    Ok(config)
}

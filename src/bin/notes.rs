//! Notes CLI Binary
//!
//! Command-line interface for the notestore storage layer.

use anyhow::Context;
use clap::Parser;
use notestore::logging::init_logging;
use notestore::tooling::cli::{Cli, CliContext};
use std::process;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config =
        CliContext::load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.logging_overrides(&mut config);
    init_logging(Some(&config.logging)).context("Failed to initialize logging")?;

    let context = CliContext::new(&config, cli.command.picked_folder())
        .context("Failed to initialize storage")?;
    let output = context.execute(&cli.command).await?;
    println!("{}", output);
    Ok(())
}

//! Caravel CLI - an incremental build driver for C and C++

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("caravel=debug")
    } else {
        EnvFilter::new("caravel=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    match cli.command {
        Commands::StaticLib(args) => commands::static_lib::execute(args),
        Commands::SharedLib(args) => commands::shared_lib::execute(args),
        Commands::App(args) => commands::app::execute(args),
    }
}

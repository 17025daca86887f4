//! Bolted - hot-reload lifecycle manager for rhai apps.

#![allow(dead_code)]

mod cli;
mod config;
mod core;
mod freshness;
mod graph;
mod logger;
mod manager;
mod orchestrator;
mod resolver;
mod runtime;
mod source;
mod supervisor;
mod utils;
mod watch;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::BoltedConfig;

fn main() -> Result<()> {
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {}
    }
    logger::set_verbose(cli.verbose);

    let config = BoltedConfig::load(&cli)?;

    match &cli.command {
        Commands::Run { .. } => cli::run::run_manager(config),
        Commands::Check { json, pretty } => {
            if !cli::check::run_check(&config, *json, *pretty)? {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Hot-reload lifecycle manager for rhai apps
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// When to color output
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file, searched upward from the working directory
    #[arg(short = 'C', long, global = true, default_value = "bolted.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Shared modules directory (relative to project root)
    #[arg(short, long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub modules: Option<PathBuf>,

    /// App definitions directory (relative to project root)
    #[arg(short, long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub apps: Option<PathBuf>,

    /// Instance configuration file (relative to project root)
    #[arg(short, long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub instances: Option<PathBuf>,

    /// Log graph, resolver and watcher detail
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Load every app and supervise instances until Ctrl+C
    #[command(visible_alias = "r")]
    Run {
        /// Debounce window in milliseconds (overrides [reload] debounce_ms)
        #[arg(short, long)]
        debounce: Option<u64>,
    },

    /// Analyze sources and configuration without starting anything
    #[command(visible_alias = "c")]
    Check {
        /// Print the plan and diagnostics as JSON
        #[arg(short, long)]
        json: bool,

        /// Indent the JSON
        #[arg(short, long, requires = "json")]
        pretty: bool,
    },
}

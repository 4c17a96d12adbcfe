//! CLI argument parsing, logging setup and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::LevelFilter;

use crate::commands;

pub const BIN_NAME: &str = "repo-access";

/// Repository Access - Provision cloud access for declared repositories
#[derive(Parser, Debug)]
#[command(name = "repo-access")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace). RUST_LOG takes
    /// precedence when set.
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Preview a provisioning run against the in-memory backend
    Plan(commands::plan::PlanArgs),

    /// Check every access request against the configured targets
    Validate(commands::validate::ValidateArgs),

    /// List repositories and the integrations they take part in
    Ls(commands::ls::LsArgs),

    /// Show which repositories each cloud target serves
    Tree(commands::tree::TreeArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        init_logging(&self.log_level, &self.color)?;

        match self.command {
            Commands::Plan(args) => commands::plan::execute(args, &self.color),
            Commands::Validate(args) => commands::validate::execute(args, &self.color),
            Commands::Ls(args) => commands::ls::execute(args),
            Commands::Tree(args) => commands::tree::execute(args),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}

fn parse_level(level: &str) -> Result<LevelFilter> {
    level
        .parse::<LevelFilter>()
        .map_err(|_| anyhow::anyhow!("Invalid log level '{}': expected error, warn, info, debug or trace", level))
}

fn write_style(color: &str) -> env_logger::WriteStyle {
    match color {
        "always" => env_logger::WriteStyle::Always,
        "never" => env_logger::WriteStyle::Never,
        _ => env_logger::WriteStyle::Auto,
    }
}

fn init_logging(level: &str, color: &str) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(parse_level(level)?)
        .write_style(write_style(color))
        .format_timestamp(None)
        .parse_env("RUST_LOG");
    // Already initialised in tests running several commands.
    let _ = builder.try_init();
    Ok(())
}

//! # Repository Access CLI
//!
//! Binary entry point for the `repo-access` command-line tool. It parses the
//! arguments with `clap` and dispatches to one of the commands. All
//! provisioning logic lives in the `repo_access` library crate.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}

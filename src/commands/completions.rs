//! # Completions Command Implementation
//!
//! Generates shell completion scripts for every `repo-access` command and
//! option using `clap_complete`.
//!
//! ```bash
//! repo-access completions bash > ~/.local/share/bash-completion/completions/repo-access
//! repo-access completions zsh > ~/.zfunc/_repo-access
//! ```

use anyhow::Result;
use clap::{Args, CommandFactory, ValueEnum};
use clap_complete::{generate, Shell};
use std::io;

use crate::cli::{Cli, BIN_NAME};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell")]
    PowerShell,
    Elvish,
}

impl From<CompletionShell> for Shell {
    fn from(shell: CompletionShell) -> Self {
        match shell {
            CompletionShell::Bash => Shell::Bash,
            CompletionShell::Zsh => Shell::Zsh,
            CompletionShell::Fish => Shell::Fish,
            CompletionShell::PowerShell => Shell::PowerShell,
            CompletionShell::Elvish => Shell::Elvish,
        }
    }
}

/// Generate shell completion scripts
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// The shell to generate completions for
    #[arg(value_enum)]
    pub shell: CompletionShell,
}

/// Execute the `completions` command, writing the script to stdout.
pub fn execute(args: CompletionsArgs) -> Result<()> {
    write_completions(args.shell, &mut io::stdout());
    Ok(())
}

fn write_completions(shell: CompletionShell, out: &mut dyn io::Write) {
    let mut cmd = Cli::command();
    generate(Shell::from(shell), &mut cmd, BIN_NAME, out);
}

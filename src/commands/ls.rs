//! # Ls Command Implementation
//!
//! Lists the declared repositories with the integrations each one takes
//! part in, as derived from the declarations.

use anyhow::Result;
use clap::{Args, ValueEnum};

use repo_access::exports::{integration_flags, IntegrationFlags};
use repo_access::output::{render, OutputFormat};

use super::{load_inputs, InputArgs};

/// List repositories and their integrations
#[derive(Args, Debug)]
pub struct LsArgs {
    #[command(flatten)]
    pub inputs: InputArgs,

    /// Only list repositories taking part in this integration.
    #[arg(short, long, value_enum)]
    pub integration: Option<Integration>,

    /// Print the flags in a structured format instead of a table.
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Show only the number of matching repositories.
    #[arg(long)]
    pub count: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Integration {
    Gitlab,
    Google,
    Gcs,
    Aws,
    Vault,
    Tailscale,
}

impl Integration {
    fn enabled(self, flags: &IntegrationFlags) -> bool {
        match self {
            Integration::Gitlab => flags.gitlab,
            Integration::Google => flags.google,
            Integration::Gcs => flags.gcs,
            Integration::Aws => flags.aws,
            Integration::Vault => flags.vault,
            Integration::Tailscale => flags.tailscale,
        }
    }
}

/// Execute the `ls` command.
pub fn execute(args: LsArgs) -> Result<()> {
    let (_, registry) = load_inputs(&args.inputs)?;
    let mut flags = integration_flags(&registry);
    if let Some(integration) = args.integration {
        flags.retain(|_, flags| integration.enabled(flags));
    }

    if args.count {
        println!("{}", flags.len());
        return Ok(());
    }
    if let Some(format) = args.format {
        println!("{}", render(&flags, format)?);
        return Ok(());
    }

    let width = flags.keys().map(String::len).max().unwrap_or(0);
    for (name, flags) in &flags {
        println!("{:<width$}  {}", name, describe(flags), width = width);
    }
    Ok(())
}

fn describe(flags: &IntegrationFlags) -> String {
    let names: Vec<&str> = [
        (flags.aws, "aws"),
        (flags.google, "google"),
        (flags.gcs, "gcs"),
        (flags.vault, "vault"),
        (flags.gitlab, "gitlab"),
        (flags.tailscale, "tailscale"),
    ]
    .into_iter()
    .filter_map(|(on, name)| on.then_some(name))
    .collect();
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(",")
    }
}

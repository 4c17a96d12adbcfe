//! # Validate Command Implementation
//!
//! Loads the settings and every repository declaration, then runs the
//! grouping engine of each cloud provider and reports every request that
//! references an account or project outside the allow list.
//!
//! Read-only: no collaborator is called.

use anyhow::Result;
use clap::Args;

use repo_access::output::{emoji, OutputConfig};
use repo_access::phases::grouping::{group_repositories, ValidationReport};
use repo_access::providers::cloud_providers;
use repo_access::suggestions::rejection_hint;

use super::{load_inputs, InputArgs};

/// Validate the settings and repository declarations
#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub inputs: InputArgs,
}

/// Execute the `validate` command.
pub fn execute(args: ValidateArgs, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    println!(
        "{} Validating settings: {}",
        emoji(&out, "🔍", "[SCAN]"),
        args.inputs.config.display()
    );

    let (settings, registry) = load_inputs(&args.inputs)?;
    println!(
        "{} Loaded {} repository declarations",
        emoji(&out, "✅", "[OK]"),
        registry.len()
    );

    let mut report = ValidationReport::default();
    for provider in cloud_providers(&settings) {
        let allowed = provider.allow_list();
        let grouping = group_repositories(&*provider, registry.repositories());
        println!(
            "\n{} {}: {} allowed targets, {} accepted requests",
            emoji(&out, "📊", "[INFO]"),
            provider.provider(),
            allowed.len(),
            grouping.requests.len()
        );
        for rejection in grouping.report.rejections() {
            println!("{} {}", emoji(&out, "❌", "[ERR]"), rejection);
            println!("   {}", rejection_hint(rejection, &allowed));
        }
        report.extend(grouping.report);
    }

    if !report.is_empty() {
        anyhow::bail!("{} requests reference unconfigured targets", report.len());
    }
    println!("\n{} All access requests are valid", emoji(&out, "✅", "[OK]"));
    Ok(())
}

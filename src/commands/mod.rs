//! # CLI Command Implementations
//!
//! One module per `repo-access` subcommand. Each holds an `Args` struct
//! derived with `clap` and an `execute` function calling into the
//! `repo_access` library.
//!
//! The arguments every command shares (where to read the settings and the
//! repository declarations from, and the run toggles) live here.

use std::convert::Infallible;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use repo_access::config::Settings;
use repo_access::context::{
    parse_toggle, RunContext, ALLOW_REPOSITORY_DELETION, IGNORE_UNMANAGED_REPOSITORIES,
    VAULT_TOKEN,
};
use repo_access::defaults::{
    CONFIG_ENV, DEFAULT_CONFIG_FILENAME, DEFAULT_REPOSITORIES_DIR, REPOSITORIES_ENV,
};
use repo_access::registry::Registry;
use repo_access::suggestions;

pub mod completions;
pub mod ls;
pub mod plan;
pub mod tree;
pub mod validate;

/// Input locations shared by every command.
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Path to the settings file.
    #[arg(short, long, value_name = "FILE", env = CONFIG_ENV, default_value = DEFAULT_CONFIG_FILENAME)]
    pub config: PathBuf,

    /// Directory holding one declaration file per repository.
    #[arg(short, long, value_name = "DIR", env = REPOSITORIES_ENV, default_value = DEFAULT_REPOSITORIES_DIR)]
    pub repositories: PathBuf,
}

/// Toggles of a provisioning run.
#[derive(Args, Debug, Clone, Default)]
pub struct ToggleArgs {
    /// Let the backend delete managed repositories that disappear.
    #[arg(long, value_name = "BOOL", env = ALLOW_REPOSITORY_DELETION, default_value = "false", value_parser = toggle)]
    pub allow_repository_deletion: bool,

    /// Skip unmanaged repositories that are not imported instead of failing.
    #[arg(long, value_name = "BOOL", env = IGNORE_UNMANAGED_REPOSITORIES, default_value = "false", value_parser = toggle)]
    pub ignore_unmanaged_repositories: bool,

    /// Token of the secret store. Secret stores are skipped without it.
    #[arg(long, value_name = "TOKEN", env = VAULT_TOKEN, hide_env_values = true)]
    pub vault_token: Option<String>,
}

fn toggle(value: &str) -> std::result::Result<bool, Infallible> {
    Ok(parse_toggle(value))
}

/// Load the settings file and every repository declaration.
pub fn load_inputs(inputs: &InputArgs) -> Result<(Settings, Registry)> {
    if !inputs.config.exists() {
        return Err(suggestions::config_not_found(&inputs.config));
    }
    if !inputs.repositories.is_dir() {
        return Err(suggestions::repositories_not_found(&inputs.repositories));
    }

    let settings = Settings::from_file(&inputs.config)
        .with_context(|| format!("Failed to load settings from {}", inputs.config.display()))?;
    let registry = Registry::from_dir(&inputs.repositories).with_context(|| {
        format!(
            "Failed to load repository declarations from {}",
            inputs.repositories.display()
        )
    })?;
    Ok((settings, registry))
}

/// Fold the settings and toggles into the context of one run.
pub fn run_context(settings: Settings, toggles: &ToggleArgs) -> RunContext {
    RunContext::new(settings)
        .with_repository_deletion(toggles.allow_repository_deletion)
        .with_ignore_unmanaged(toggles.ignore_unmanaged_repositories)
        .with_vault_token(toggles.vault_token.clone())
}


#[cfg(test)]
mod tests {
    use super::test_support::write_inputs;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_inputs() {
        let dir = TempDir::new().unwrap();
        let inputs = write_inputs(dir.path(), &[("svc-x", "name: svc-x\n")]);

        let (settings, registry) = load_inputs(&inputs).unwrap();
        assert_eq!(settings.repositories.owner, "example");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_missing_settings_has_hint() {
        let dir = TempDir::new().unwrap();
        let inputs = InputArgs {
            config: dir.path().join("missing.yaml"),
            repositories: dir.path().to_path_buf(),
        };
        let err = load_inputs(&inputs).unwrap_err();
        assert!(err.to_string().contains("hint:"));
    }

    #[test]
    fn test_missing_repositories_dir() {
        let dir = TempDir::new().unwrap();
        let mut inputs = write_inputs(dir.path(), &[]);
        inputs.repositories = dir.path().join("nope");
        let err = load_inputs(&inputs).unwrap_err();
        assert!(err.to_string().contains("Repository declarations not found"));
    }

    #[test]
    fn test_run_context_from_toggles() {
        let settings = Settings::parse("repositories:\n  owner: example\n").unwrap();
        let toggles = ToggleArgs {
            allow_repository_deletion: true,
            ..Default::default()
        };
        let ctx = run_context(settings, &toggles);
        assert!(ctx.allow_repository_deletion);
        assert!(!ctx.ignore_unmanaged_repositories);
    }
}

//! # Plan Command Implementation
//!
//! Runs the complete orchestration against the in-memory planning backend
//! and prints what a real run would do: every planned action and the
//! outputs it would publish. Nothing outside the process is touched.
//!
//! Exits non-zero when a provider or repository failed.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use repo_access::backend::Backends;
use repo_access::exports::RunOutputs;
use repo_access::output::{emoji, render, OutputConfig, OutputFormat};
use repo_access::phases::orchestrator::{execute_run, RunReport};
use repo_access::phases::Failure;
use repo_access::plan::{PlanBackend, PlannedAction};

use super::{load_inputs, run_context, InputArgs, ToggleArgs};

/// Preview a provisioning run
#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub inputs: InputArgs,

    #[command(flatten)]
    pub toggles: ToggleArgs,

    /// Output format.
    #[arg(short, long, value_enum, default_value = "yaml")]
    pub format: OutputFormat,

    /// Print only the outputs, without the planned actions.
    #[arg(long)]
    pub outputs_only: bool,

    /// Repositories already imported into source control. Without this flag
    /// every repository counts as imported.
    #[arg(long, value_name = "NAME", value_delimiter = ',')]
    pub imported: Option<Vec<String>>,
}

#[derive(Serialize)]
struct PlanDocument<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    actions: Option<Vec<PlannedAction>>,
    outputs: &'a RunOutputs,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<&'a Failure>,
}

/// Execute the `plan` command.
pub fn execute(args: PlanArgs, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let (settings, registry) = load_inputs(&args.inputs)?;
    let ctx = run_context(settings, &args.toggles);

    let mut backend = PlanBackend::new();
    if let Some(imported) = args.imported {
        backend = backend.with_imported(imported);
    }
    let backend = Arc::new(backend);

    let report = execute_run(&ctx, &registry, &Backends::uniform(backend.clone()))?;

    let document = plan_document(&report, &backend, args.outputs_only);
    println!("{}", render(&document, args.format)?);

    for rejection in report.validation.rejections() {
        eprintln!("{} {}", emoji(&out, "⚠️", "[WARN]"), rejection);
    }
    if !report.is_clean() {
        anyhow::bail!(
            "{} run finished with {} failed repositories and {} aborted providers",
            emoji(&out, "❌", "[ERR]"),
            report.failures.len(),
            report.aborted.len()
        );
    }
    Ok(())
}

fn plan_document<'a>(
    report: &'a RunReport,
    backend: &PlanBackend,
    outputs_only: bool,
) -> PlanDocument<'a> {
    PlanDocument {
        actions: (!outputs_only).then(|| backend.sorted_actions()),
        outputs: &report.outputs,
        failures: report.failures.iter().chain(report.aborted.iter()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::write_inputs;
    use tempfile::TempDir;

    fn args(inputs: InputArgs) -> PlanArgs {
        PlanArgs {
            inputs,
            toggles: ToggleArgs::default(),
            format: OutputFormat::Json,
            outputs_only: false,
            imported: None,
        }
    }

    #[test]
    fn test_plan_succeeds() {
        let dir = TempDir::new().unwrap();
        let inputs = write_inputs(
            dir.path(),
            &[(
                "svc-x",
                "name: svc-x\naccessPermissions:\n  google:\n    project: proj-a\n",
            )],
        );
        assert!(execute(args(inputs), "never").is_ok());
    }

    #[test]
    fn test_plan_fails_on_unimported_repository() {
        let dir = TempDir::new().unwrap();
        let inputs = write_inputs(dir.path(), &[("legacy", "name: legacy\nmanageLifecycle: false\n")]);
        let mut args = args(inputs);
        args.imported = Some(vec![]);

        let err = execute(args, "never").unwrap_err();
        assert!(err.to_string().contains("not imported"));
    }

    #[test]
    fn test_outputs_only_skips_actions() {
        let backend = PlanBackend::new();
        let report = RunReport::default();
        let document = plan_document(&report, &backend, true);
        assert!(document.actions.is_none());
        let value = serde_json::to_value(&document).unwrap();
        assert!(value.get("actions").is_none());
        assert!(value.get("failures").is_none());
    }
}

//! Orchestrator for a complete provisioning run
//!
//! Coordinates all stages and collects their reports into the published
//! outputs.

use rayon::prelude::*;
use serde::Serialize;

use crate::backend::Backends;
use crate::context::RunContext;
use crate::error::Result;
use crate::exports::{
    integration_flags, GitLabOutputs, ProviderOutputs, RunOutputs, TailscaleOutputs, VaultOutputs,
};
use crate::providers::{cloud_providers, AllowList, Provider};
use crate::registry::Registry;

use super::grouping::ValidationReport;
use super::{cloud, github, gitlab, tailscale, vault, Failure, ProviderReport};

/// Everything a finished run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub outputs: RunOutputs,
    pub validation: ValidationReport,
    /// Repositories that failed inside a provider.
    pub failures: Vec<Failure>,
    /// Providers that were aborted as a whole.
    pub aborted: Vec<Failure>,
}

impl RunReport {
    /// No provider or repository failed. Validation rejections do not count.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.aborted.is_empty()
    }

    fn absorb(&mut self, report: &ProviderReport) {
        self.validation.extend(report.validation.clone());
        self.failures.extend(report.failures.iter().cloned());
        self.aborted.extend(report.aborted.iter().cloned());
    }
}

/// Execute a complete run
///
/// 1. Ensure source repositories (fatal)
/// 2. Create secret stores and auth (mount failures are fatal)
/// 3. Configure every cloud provider, GitLab and Tailscale in parallel
/// 4. Assemble the outputs
///
/// An `Err` means nothing may be published. Failures inside stage 3 are
/// recorded in the returned report instead.
pub fn execute_run(ctx: &RunContext, registry: &Registry, backends: &Backends) -> Result<RunReport> {
    // Stage 1: Source repositories
    let handles = github::ensure_repositories(ctx, registry, backends.source_control.as_ref())?;

    // Stage 2: Secret stores
    let stores = vault::configure_stores(
        ctx,
        registry,
        &handles,
        backends.secrets.as_ref(),
        backends.vault.as_ref(),
        backends.source_control.as_ref(),
    )?;
    let mounts = &stores.mounts;

    // Stage 3: Provider fan-out
    let providers = cloud_providers(&ctx.settings);
    let (cloud_reports, (gitlab_report, tailscale_report)) = rayon::join(
        || {
            providers
                .par_iter()
                .filter_map(|provider| -> Option<(AllowList, ProviderReport)> {
                    let backend = backends.identity(provider.provider())?;
                    let report = cloud::configure(
                        ctx,
                        registry,
                        &**provider,
                        backend,
                        backends.secrets.as_ref(),
                        mounts,
                    );
                    Some((provider.allow_list(), report))
                })
                .collect::<Vec<_>>()
        },
        || {
            rayon::join(
                || gitlab::configure(registry, backends.gitlab.as_ref(), backends.secrets.as_ref(), mounts),
                || {
                    tailscale::configure(
                        registry,
                        backends.tailscale.as_ref(),
                        backends.secrets.as_ref(),
                        mounts,
                    )
                },
            )
        },
    );

    // Stage 4: Outputs
    let mut report = RunReport::default();
    if let Some(vault_report) = &stores.report {
        report.absorb(vault_report);
    }
    for (allowed, provider_report) in &cloud_reports {
        report.absorb(provider_report);
        let outputs = ProviderOutputs::new(allowed, provider_report.configured.clone());
        match provider_report.provider {
            Provider::Aws => report.outputs.aws = outputs,
            Provider::Google => report.outputs.google = outputs,
            Provider::Scaleway => report.outputs.scaleway = outputs,
            _ => {}
        }
    }
    report.absorb(&gitlab_report);
    report.absorb(&tailscale_report);

    report.outputs.gitlab = GitLabOutputs {
        tokens: gitlab_report.repositories.iter().cloned().collect(),
    };
    report.outputs.tailscale = TailscaleOutputs {
        clients: tailscale_report.repositories.iter().cloned().collect(),
    };
    report.outputs.vault = VaultOutputs {
        projects: stores.mounts.keys().cloned().collect(),
    };
    report.outputs.repositories = integration_flags(registry);

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AccessLevel, AwsAccess, GoogleAccess, LinkedAccess, RepositoryDeclaration, Settings,
    };
    use crate::plan::{PlanBackend, PlannedAction};
    use std::sync::Arc;

    const SETTINGS: &str = r#"
repositories:
  owner: example
aws:
  defaultRegion: eu-west-1
  account:
    "111111111111": {}
google:
  defaultRegion: europe-west4
  projects: [proj-a, proj-b]
vault:
  enabled: true
  address: https://vault.example.com
"#;

    fn ctx() -> RunContext {
        RunContext::new(Settings::parse(SETTINGS).unwrap()).with_vault_token(Some("s.token".to_string()))
    }

    fn google_repo(name: &str, project: &str) -> RepositoryDeclaration {
        let mut repo = RepositoryDeclaration::new(name);
        repo.access_permissions.google = Some(GoogleAccess {
            project: Some(project.to_string()),
            ..Default::default()
        });
        repo
    }

    fn registry() -> Registry {
        let mut svc_x = google_repo("svc-x", "proj-a");
        if let Some(google) = svc_x.access_permissions.google.as_mut() {
            google.linked_projects.insert(
                "proj-b".to_string(),
                LinkedAccess {
                    access_level: AccessLevel::Restricted,
                    iam_permissions: vec!["storage.objects.get".to_string()],
                },
            );
        }
        let mut svc_y = google_repo("svc-y", "proj-a");
        svc_y.access_permissions.aws = Some(AwsAccess {
            account: Some("111111111111".to_string()),
            ..Default::default()
        });
        Registry::new(vec![svc_x, svc_y, google_repo("svc-bad", "unknown-project")]).unwrap()
    }

    #[test]
    fn test_full_run_outputs() {
        let backend = Arc::new(PlanBackend::new());
        let report = execute_run(&ctx(), &registry(), &Backends::uniform(backend.clone())).unwrap();

        assert!(report.is_clean());
        let google = &report.outputs.google;
        assert_eq!(google.allowed, vec!["proj-a", "proj-b"]);
        assert_eq!(google.configured["proj-a"], vec!["svc-x", "svc-y"]);
        assert_eq!(google.configured["proj-b"], vec!["svc-x"]);
        assert_eq!(report.outputs.aws.configured["111111111111"], vec!["svc-y"]);
        assert!(report.outputs.scaleway.configured.is_empty());
        assert_eq!(report.outputs.vault.projects, vec!["svc-bad", "svc-x", "svc-y"]);
        assert_eq!(report.validation.len(), 1);
        assert!(report.validation.rejected(Provider::Google, "svc-bad"));
        assert!(report.outputs.repositories["svc-y"].aws);

        assert!(backend.secret("github-svc-x", "google-cloud").is_some());
        assert!(backend.secret("github-svc-y", "aws").is_some());
        assert!(backend.secret("github-svc-bad", "google-cloud").is_none());
    }

    #[test]
    fn test_one_federation_per_project() {
        let backend = Arc::new(PlanBackend::new());
        execute_run(&ctx(), &registry(), &Backends::uniform(backend.clone())).unwrap();

        let mut federated: Vec<String> = backend
            .actions()
            .into_iter()
            .filter_map(|a| match a {
                PlannedAction::CreateFederatedIdentity { target, .. } => Some(target),
                _ => None,
            })
            .collect();
        federated.sort();
        assert_eq!(federated, vec!["111111111111", "proj-a", "proj-b"]);
    }

    #[test]
    fn test_source_control_failure_aborts_run() {
        let backend = Arc::new(PlanBackend::new().fail_on("repository", "svc-y"));
        let result = execute_run(&ctx(), &registry(), &Backends::uniform(backend.clone()));

        assert!(result.is_err());
        assert!(!backend
            .actions()
            .iter()
            .any(|a| matches!(a, PlannedAction::CreateMount { .. })));
    }

    #[test]
    fn test_provider_abort_does_not_stop_others() {
        let backend = Arc::new(PlanBackend::new().fail_on("identity-provider", "111111111111"));
        let report = execute_run(&ctx(), &registry(), &Backends::uniform(backend)).unwrap();

        assert!(!report.is_clean());
        assert_eq!(report.aborted.len(), 1);
        assert_eq!(report.aborted[0].provider, Provider::Aws);
        assert!(report.outputs.aws.configured.is_empty());
        assert_eq!(report.outputs.google.configured["proj-a"], vec!["svc-x", "svc-y"]);
    }
}

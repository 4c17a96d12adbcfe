//! # Cloud Provider Pass
//!
//! Runs one cloud provider end to end:
//!
//! 1. Group repositories and collect validation rejections.
//! 2. Enable required services per target.
//! 3. Create the federated identity of every distinct target (barrier).
//! 4. Provision and publish every accepted repository in parallel.
//!
//! Steps 2 and 3 abort the provider on failure; step 4 failures are recorded
//! per repository and never affect siblings.

use std::collections::BTreeMap;

use log::{error, info};
use rayon::prelude::*;

use crate::backend::{IdentityBackend, SecretStore};
use crate::context::RunContext;
use crate::error::Result;
use crate::providers::CloudProvider;
use crate::registry::Registry;
use crate::secrets::SecretMount;

use super::federation::{enable_target_services, ensure_federated_identities};
use super::grouping::group_repositories;
use super::identity::{provision, ProvisionedIdentity};
use super::publication::publish_all;
use super::{Failure, ProviderReport};

pub fn configure(
    ctx: &RunContext,
    registry: &Registry,
    provider: &dyn CloudProvider,
    backend: &dyn IdentityBackend,
    store: &dyn SecretStore,
    mounts: &BTreeMap<String, SecretMount>,
) -> ProviderReport {
    let kind = provider.provider();
    let grouping = group_repositories(provider, registry.repositories());
    let mut report = ProviderReport::new(kind);
    report.validation = grouping.report.clone();

    if grouping.requests.is_empty() {
        info!("[{}][configure] no repositories requested access", kind);
        return report;
    }

    let federations = match enable_target_services(provider, backend, &grouping)
        .and_then(|_| ensure_federated_identities(provider, backend, &grouping))
    {
        Ok(federations) => federations,
        Err(e) => {
            error!("[{}][configure] aborting provider: {}", kind, e);
            report.aborted = Some(Failure::provider(kind, &e));
            return report;
        }
    };

    let results: Vec<(String, Result<ProvisionedIdentity>)> = grouping
        .requests
        .par_iter()
        .map(|(repository, request)| {
            let result = provision(ctx, provider, backend, request, &federations).and_then(
                |provisioned| {
                    publish_all(store, mounts, kind, repository, &provisioned.secrets)?;
                    Ok(provisioned)
                },
            );
            (repository.clone(), result)
        })
        .collect();

    for (repository, result) in results {
        match result {
            Ok(provisioned) => {
                report.record_success(
                    &repository,
                    provisioned.targets.iter().map(String::as_str),
                );
            }
            Err(e) => {
                error!("[{}][iam] {}: {}", kind, e, repository);
                report.record_failure(&repository, &e);
            }
        }
    }

    info!(
        "[{}][configure] configured {} of {} repositories",
        kind,
        report.repositories.len(),
        grouping.requests.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AwsAccess, AwsAccount, AwsSettings, RepositoryDeclaration, Settings};
    use crate::plan::{PlanBackend, PlannedAction};
    use crate::providers::{AwsProvider, Provider};

    fn ctx() -> RunContext {
        RunContext::new(Settings::parse("repositories:\n  owner: example\n").unwrap())
    }

    fn aws() -> AwsProvider {
        let mut settings = AwsSettings {
            default_region: Some("eu-west-1".to_string()),
            ..Default::default()
        };
        settings
            .account
            .insert("111111111111".to_string(), AwsAccount::default());
        AwsProvider::new(settings)
    }

    fn aws_repo(name: &str, account: &str) -> RepositoryDeclaration {
        let mut repo = RepositoryDeclaration::new(name);
        repo.access_permissions.aws = Some(AwsAccess {
            account: Some(account.to_string()),
            ..Default::default()
        });
        repo
    }

    fn mounts(names: &[&str]) -> BTreeMap<String, SecretMount> {
        names
            .iter()
            .map(|n| (n.to_string(), SecretMount::new(SecretMount::repository_path(n))))
            .collect()
    }

    #[test]
    fn test_shared_account_gets_one_federation_and_two_roles() {
        let registry = Registry::new(vec![
            aws_repo("svc-x", "111111111111"),
            aws_repo("svc-y", "111111111111"),
        ])
        .unwrap();
        let backend = PlanBackend::new();

        let report = configure(
            &ctx(),
            &registry,
            &aws(),
            &backend,
            &backend,
            &mounts(&["svc-x", "svc-y"]),
        );

        assert!(report.is_clean());
        assert_eq!(report.configured["111111111111"], vec!["svc-x", "svc-y"]);
        let actions = backend.actions();
        let federations = actions
            .iter()
            .filter(|a| matches!(a, PlannedAction::CreateFederatedIdentity { .. }))
            .count();
        assert_eq!(federations, 1);
        let subjects: Vec<_> = actions
            .iter()
            .filter_map(|a| match a {
                PlannedAction::CreateServiceIdentity { subject, .. } => subject.clone(),
                _ => None,
            })
            .collect();
        assert_eq!(subjects.len(), 2);
        assert!(subjects.contains(&"repo:example/svc-x:*".to_string()));
        assert!(subjects.contains(&"repo:example/svc-y:*".to_string()));
    }

    #[test]
    fn test_rejected_repository_is_not_configured() {
        let registry = Registry::new(vec![
            aws_repo("svc-x", "111111111111"),
            aws_repo("svc-bad", "999999999999"),
        ])
        .unwrap();
        let backend = PlanBackend::new();

        let report = configure(&ctx(), &registry, &aws(), &backend, &backend, &mounts(&["svc-x"]));

        assert!(report.is_clean());
        assert_eq!(report.configured["111111111111"], vec!["svc-x"]);
        assert!(report.validation.rejected(Provider::Aws, "svc-bad"));
        assert!(!report.repositories.contains("svc-bad"));
    }

    #[test]
    fn test_federation_failure_aborts_provider() {
        let registry = Registry::new(vec![aws_repo("svc-x", "111111111111")]).unwrap();
        let backend = PlanBackend::new().fail_on("identity-provider", "111111111111");

        let report = configure(&ctx(), &registry, &aws(), &backend, &backend, &mounts(&["svc-x"]));

        assert!(report.aborted.is_some());
        assert!(report.configured.is_empty());
        assert!(!backend
            .actions()
            .iter()
            .any(|a| matches!(a, PlannedAction::CreateServiceIdentity { .. })));
    }

    #[test]
    fn test_repository_failure_does_not_affect_siblings() {
        let registry = Registry::new(vec![
            aws_repo("svc-x", "111111111111"),
            aws_repo("svc-y", "111111111111"),
        ])
        .unwrap();
        let backend = PlanBackend::new().fail_on("secret", "github-svc-x");

        let report = configure(
            &ctx(),
            &registry,
            &aws(),
            &backend,
            &backend,
            &mounts(&["svc-x", "svc-y"]),
        );

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].repository.as_deref(), Some("svc-x"));
        assert_eq!(report.configured["111111111111"], vec!["svc-y"]);
        assert!(report.aborted.is_none());
    }

    #[test]
    fn test_no_requests_no_calls() {
        let registry = Registry::new(vec![RepositoryDeclaration::new("svc-x")]).unwrap();
        let backend = PlanBackend::new();

        let report = configure(&ctx(), &registry, &aws(), &backend, &backend, &BTreeMap::new());

        assert!(report.configured.is_empty());
        assert!(backend.actions().is_empty());
    }
}

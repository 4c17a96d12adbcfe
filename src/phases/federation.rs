//! # Identity Federation
//!
//! Creates the one federated identity each distinct target needs before any
//! repository in that provider is provisioned. Targets are independent, so
//! they are processed in parallel; the function only returns once every
//! target is done, which makes it the barrier between grouping and identity
//! provisioning.
//!
//! Any failure here is fatal for the provider.

use std::collections::BTreeMap;

use log::{error, info};
use rayon::prelude::*;

use crate::backend::{FederatedIdentity, IdentityBackend};
use crate::error::Result;
use crate::providers::CloudProvider;

use super::grouping::{target_services, Grouping};

/// Enable the union of required services in every target.
pub fn enable_target_services(
    provider: &dyn CloudProvider,
    backend: &dyn IdentityBackend,
    grouping: &Grouping,
) -> Result<()> {
    let services = target_services(provider, grouping);
    services
        .par_iter()
        .map(|(target, services)| -> Result<()> {
            let identity = provider.target_identity(target, None, None)?;
            let services: Vec<String> = services.iter().cloned().collect();
            backend.enable_services(&identity, &services).inspect_err(|e| {
                error!(
                    "[{}][services] error enabling services: {} - {}",
                    provider.provider(),
                    target,
                    e
                )
            })
        })
        .collect::<Result<Vec<()>>>()?;
    Ok(())
}

/// Create exactly one federated identity per distinct target of `grouping`.
///
/// Returns an empty map for providers without federation.
pub fn ensure_federated_identities(
    provider: &dyn CloudProvider,
    backend: &dyn IdentityBackend,
    grouping: &Grouping,
) -> Result<BTreeMap<String, FederatedIdentity>> {
    if !provider.federates() {
        return Ok(BTreeMap::new());
    }

    grouping
        .distinct_targets()
        .par_iter()
        .map(|target| -> Result<(String, FederatedIdentity)> {
            let identity = provider.target_identity(target, None, None)?;
            let federation = backend.create_federated_identity(&identity).inspect_err(|e| {
                error!(
                    "[{}][identity-provider] error creating federated identity: {} - {}",
                    provider.provider(),
                    target,
                    e
                )
            })?;
            info!(
                "[{}][identity-provider] federated identity ready: {}",
                provider.provider(),
                target
            );
            Ok((target.to_string(), federation))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{PermissionGrant, ServiceIdentity, ServiceIdentityRequest, TargetIdentity};
    use crate::config::{
        AccessLevel, AwsAccess, AwsAccount, AwsSettings, GoogleAccess, GoogleSettings,
        LinkedAccess, RepositoryDeclaration, ScalewayAccess, ScalewaySettings,
    };
    use crate::error::Error;
    use crate::phases::grouping::group_repositories;
    use crate::providers::{AwsProvider, GoogleProvider, Provider, ScalewayProvider};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBackend {
        federations: Mutex<Vec<String>>,
        services: Mutex<Vec<(String, Vec<String>)>>,
        fail_target: Option<String>,
    }

    impl IdentityBackend for RecordingBackend {
        fn create_federated_identity(&self, target: &TargetIdentity) -> Result<FederatedIdentity> {
            if self.fail_target.as_deref() == Some(target.id.as_str()) {
                return Err(Error::provisioning(
                    target.provider,
                    "identity-provider",
                    target.id.clone(),
                    "quota exceeded",
                ));
            }
            self.federations.lock().unwrap().push(target.id.clone());
            Ok(FederatedIdentity {
                provider: target.provider,
                target: target.id.clone(),
                id: format!("federation-{}", target.id),
                provider_name: None,
            })
        }

        fn create_service_identity(&self, _request: &ServiceIdentityRequest) -> Result<ServiceIdentity> {
            unreachable!("not used by federation")
        }

        fn bind_permissions(&self, _identity: &ServiceIdentity, _grant: &PermissionGrant) -> Result<()> {
            unreachable!("not used by federation")
        }

        fn enable_services(&self, target: &TargetIdentity, services: &[String]) -> Result<()> {
            self.services
                .lock()
                .unwrap()
                .push((target.id.clone(), services.to_vec()));
            Ok(())
        }
    }

    fn aws() -> AwsProvider {
        let mut settings = AwsSettings::default();
        settings
            .account
            .insert("111111111111".to_string(), AwsAccount::default());
        settings
            .account
            .insert("222222222222".to_string(), AwsAccount::default());
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

    #[test]
    fn test_one_federation_per_shared_target() {
        let provider = aws();
        let backend = RecordingBackend::default();
        let repositories = vec![
            aws_repo("svc-x", "111111111111"),
            aws_repo("svc-y", "111111111111"),
            aws_repo("svc-z", "222222222222"),
        ];
        let grouping = group_repositories(&provider, &repositories);

        let federations = ensure_federated_identities(&provider, &backend, &grouping).unwrap();

        let mut created = backend.federations.lock().unwrap().clone();
        created.sort();
        assert_eq!(created, vec!["111111111111", "222222222222"]);
        assert_eq!(federations.len(), 2);
        assert_eq!(federations["111111111111"].id, "federation-111111111111");
    }

    #[test]
    fn test_linked_targets_are_federated() {
        let provider = GoogleProvider::new(GoogleSettings {
            projects: vec!["proj-a".to_string(), "proj-b".to_string()],
            ..Default::default()
        });
        let mut repo = RepositoryDeclaration::new("svc-x");
        let mut google = GoogleAccess {
            project: Some("proj-a".to_string()),
            ..Default::default()
        };
        google.linked_projects.insert(
            "proj-b".to_string(),
            LinkedAccess {
                access_level: AccessLevel::Restricted,
                iam_permissions: vec![],
            },
        );
        repo.access_permissions.google = Some(google);
        let mut other = RepositoryDeclaration::new("svc-y");
        other.access_permissions.google = Some(GoogleAccess {
            project: Some("proj-b".to_string()),
            ..Default::default()
        });
        let backend = RecordingBackend::default();
        let grouping = group_repositories(&provider, &[repo, other]);

        let federations = ensure_federated_identities(&provider, &backend, &grouping).unwrap();
        assert_eq!(federations.keys().collect::<Vec<_>>(), vec!["proj-a", "proj-b"]);
        let mut created = backend.federations.lock().unwrap().clone();
        created.sort();
        assert_eq!(created, vec!["proj-a", "proj-b"]);

        enable_target_services(&provider, &backend, &grouping).unwrap();
        let services = backend.services.lock().unwrap();
        assert_eq!(services.len(), 2);
        assert!(services
            .iter()
            .all(|(_, s)| s.contains(&"iam.googleapis.com".to_string())));
    }

    #[test]
    fn test_failure_aborts() {
        let provider = aws();
        let backend = RecordingBackend {
            fail_target: Some("222222222222".to_string()),
            ..Default::default()
        };
        let grouping = group_repositories(
            &provider,
            &[aws_repo("svc-x", "111111111111"), aws_repo("svc-z", "222222222222")],
        );

        let err = ensure_federated_identities(&provider, &backend, &grouping).unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn test_non_federating_provider_creates_nothing() {
        let mut settings = ScalewaySettings::default();
        settings
            .projects
            .insert("main".to_string(), "id-1".to_string());
        let provider = ScalewayProvider::new(settings);
        let mut repo = RepositoryDeclaration::new("svc-x");
        repo.access_permissions.scaleway = Some(ScalewayAccess {
            project: Some("main".to_string()),
            ..Default::default()
        });
        let backend = RecordingBackend::default();
        let grouping = group_repositories(&provider, &[repo]);

        let federations = ensure_federated_identities(&provider, &backend, &grouping).unwrap();
        assert!(federations.is_empty());
        assert!(backend.federations.lock().unwrap().is_empty());
        assert_eq!(provider.provider(), Provider::Scaleway);
    }
}

//! # Per-Repository Identity Provisioning
//!
//! For one accepted request: name and create the service identity, bind it
//! to the primary target's federated identity, grant the effective
//! permissions in every target, and assemble the secret records the
//! repository's CI will read.
//!
//! Any error aborts this repository only.

use std::collections::BTreeMap;

use log::{debug, info};

use crate::backend::{
    FederatedIdentity, IdentityBackend, PermissionGrant, ServiceIdentity, ServiceIdentityRequest,
};
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::permissions::effective_permissions;
use crate::providers::google::STORAGE_SECRET_KEY;
use crate::providers::{CloudProvider, TrustCondition};
use crate::secrets::SecretPayload;

use super::grouping::ResolvedRequest;

/// A provisioned repository and the secret records it produced.
#[derive(Debug, Clone)]
pub struct ProvisionedIdentity {
    pub repository: String,
    pub identity: ServiceIdentity,
    /// Secret key to payload, in write order.
    pub secrets: Vec<(String, SecretPayload)>,
    /// Every target the identity was granted access in.
    pub targets: Vec<String>,
}

pub fn provision(
    ctx: &RunContext,
    provider: &dyn CloudProvider,
    backend: &dyn IdentityBackend,
    request: &ResolvedRequest,
    federations: &BTreeMap<String, FederatedIdentity>,
) -> Result<ProvisionedIdentity> {
    let kind = provider.provider();
    let name = provider
        .name_budget()
        .identity_name(&request.repository, &request.target)?;
    let primary = provider.target_identity(
        &request.target,
        request.region.as_deref(),
        request.zone.as_deref(),
    )?;

    let federation = federations.get(&request.target);
    if provider.federates() && federation.is_none() {
        return Err(Error::provisioning(
            kind,
            "identity-provider",
            request.target.clone(),
            "no federated identity for target",
        ));
    }
    let condition = TrustCondition::new(ctx.owner(), &request.repository);
    let trust = federation.and_then(|f| provider.trust_binding(f, &condition));

    let mut labels = ctx.common_labels();
    labels.insert("repository".to_string(), request.repository.clone());
    labels.insert("purpose".to_string(), "github-repository".to_string());

    let identity = backend.create_service_identity(&ServiceIdentityRequest {
        provider: kind,
        repository: request.repository.clone(),
        name: name.full.clone(),
        target: primary.clone(),
        description: format!("GitHub Repository: {}", condition.subject()),
        trust,
        labels,
    })?;
    info!(
        "[{}][iam] created service identity {}: {}",
        kind, identity.name, request.target
    );

    let mut targets = Vec::new();
    for target in request.targets() {
        let Some(role) = request.role_of(target) else {
            continue;
        };
        let is_primary = target == request.target;
        let target_identity = if is_primary {
            primary.clone()
        } else {
            provider.target_identity(target, request.region.as_deref(), request.zone.as_deref())?
        };
        let grant = PermissionGrant {
            target: target_identity,
            name: provider.grant_name(&name, target),
            permissions: effective_permissions(
                &request.iam_permissions,
                role,
                provider.default_permissions(),
            ),
            organization_permissions: provider
                .organization_permissions()
                .iter()
                .map(|p| p.to_string())
                .collect(),
        };
        backend.bind_permissions(&identity, &grant)?;
        debug!(
            "[{}][iam] bound {} permissions for {}: {}",
            kind,
            grant.permissions.len(),
            request.repository,
            target
        );
        targets.push(target.to_string());
    }

    let mut secrets = vec![(
        provider.secret_key().to_string(),
        provider.secret_payload(request, &primary, federation, &identity),
    )];
    if provider.storage_key_enabled(request) {
        let key = backend.create_storage_key(&identity)?;
        secrets.push((STORAGE_SECRET_KEY.to_string(), key.into_payload()));
    }

    Ok(ProvisionedIdentity {
        repository: request.repository.clone(),
        identity,
        secrets,
        targets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{StorageKey, TargetIdentity};
    use crate::config::{AccessLevel, GoogleSettings, LinkedAccess, ScalewaySettings, Settings};
    use crate::providers::google::DEFAULT_PERMISSIONS;
    use crate::providers::scaleway::DEFAULT_ORGANIZATION_PERMISSIONS;
    use crate::providers::{GoogleProvider, Provider, ScalewayProvider};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockBackend {
        requests: Mutex<Vec<ServiceIdentityRequest>>,
        grants: Mutex<Vec<PermissionGrant>>,
        fail_bind: Option<String>,
    }

    impl IdentityBackend for MockBackend {
        fn create_federated_identity(&self, _target: &TargetIdentity) -> Result<FederatedIdentity> {
            unreachable!("federation happens before provisioning")
        }

        fn create_service_identity(&self, request: &ServiceIdentityRequest) -> Result<ServiceIdentity> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(ServiceIdentity {
                provider: request.provider,
                name: request.name.clone(),
                principal: format!("{}@{}.iam.gserviceaccount.com", request.name, request.target.id),
                credentials: BTreeMap::new(),
            })
        }

        fn bind_permissions(&self, _identity: &ServiceIdentity, grant: &PermissionGrant) -> Result<()> {
            if self.fail_bind.as_deref() == Some(grant.target.id.as_str()) {
                return Err(Error::provisioning(
                    Provider::Google,
                    "iam",
                    grant.target.id.clone(),
                    "permission denied",
                ));
            }
            self.grants.lock().unwrap().push(grant.clone());
            Ok(())
        }

        fn create_storage_key(&self, identity: &ServiceIdentity) -> Result<StorageKey> {
            Ok(StorageKey {
                access_id: format!("GOOG-{}", identity.name),
                secret: "secret".to_string(),
            })
        }
    }

    fn ctx() -> RunContext {
        RunContext::new(Settings::parse("repositories:\n  owner: example\n").unwrap())
    }

    fn provider(allow_hmac_keys: bool) -> GoogleProvider {
        GoogleProvider::new(GoogleSettings {
            default_region: Some("europe-west4".to_string()),
            projects: vec!["proj-a".to_string(), "proj-b".to_string()],
            allow_hmac_keys,
        })
    }

    fn federations() -> BTreeMap<String, FederatedIdentity> {
        ["proj-a", "proj-b"]
            .into_iter()
            .map(|p| {
                (
                    p.to_string(),
                    FederatedIdentity {
                        provider: Provider::Google,
                        target: p.to_string(),
                        id: format!("projects/{}/locations/global/workloadIdentityPools/github", p),
                        provider_name: Some(format!("projects/{}/providers/github", p)),
                    },
                )
            })
            .collect()
    }

    fn svc_x() -> ResolvedRequest {
        let mut request = ResolvedRequest::new("svc-x", "proj-a");
        request.region = Some("europe-west4".to_string());
        request.iam_permissions = vec!["run.jobs.run".to_string()];
        request.linked.insert(
            "proj-b".to_string(),
            LinkedAccess {
                access_level: AccessLevel::Restricted,
                iam_permissions: vec!["storage.objects.get".to_string()],
            },
        );
        request
    }

    #[test]
    fn test_primary_and_linked_grants() {
        let backend = MockBackend::default();
        let provisioned = provision(&ctx(), &provider(false), &backend, &svc_x(), &federations()).unwrap();

        assert_eq!(provisioned.targets, vec!["proj-a", "proj-b"]);
        let grants = backend.grants.lock().unwrap();
        assert_eq!(grants.len(), 2);

        let mut full = vec!["run.jobs.run".to_string()];
        full.extend(DEFAULT_PERMISSIONS.iter().map(|p| p.to_string()));
        assert_eq!(grants[0].target.id, "proj-a");
        assert_eq!(grants[0].permissions, full);

        let mut restricted = vec!["storage.objects.get".to_string()];
        restricted.extend(DEFAULT_PERMISSIONS.iter().map(|p| p.to_string()));
        assert_eq!(grants[1].target.id, "proj-b");
        assert_eq!(grants[1].permissions, restricted);
    }

    #[test]
    fn test_trust_is_bound_to_primary_federation() {
        let backend = MockBackend::default();
        provision(&ctx(), &provider(false), &backend, &svc_x(), &federations()).unwrap();

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let trust = requests[0].trust.as_ref().unwrap();
        assert!(trust.federation_id.starts_with("projects/proj-a/"));
        assert!(trust.condition.matches("example/svc-x"));
        assert!(!trust.condition.matches("example/svc-x2"));
        assert_eq!(requests[0].labels.get("repository").map(String::as_str), Some("svc-x"));
    }

    #[test]
    fn test_secret_records() {
        let backend = MockBackend::default();
        let mut request = svc_x();
        request.hmac_key = true;

        let provisioned = provision(&ctx(), &provider(true), &backend, &request, &federations()).unwrap();
        let keys: Vec<_> = provisioned.secrets.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["google-cloud", "google-cloud-storage"]);
        let google = &provisioned.secrets[0].1;
        assert_eq!(google.get("workload_identity_provider"), Some("projects/proj-a/providers/github"));
        assert_eq!(google.get("region"), Some("europe-west4"));
    }

    #[test]
    fn test_missing_federation_is_an_error() {
        let backend = MockBackend::default();
        let err = provision(&ctx(), &provider(false), &backend, &svc_x(), &BTreeMap::new()).unwrap_err();
        assert!(err.to_string().contains("no federated identity"));
        assert!(backend.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_bind_failure_propagates() {
        let backend = MockBackend {
            fail_bind: Some("proj-b".to_string()),
            ..Default::default()
        };
        let err = provision(&ctx(), &provider(false), &backend, &svc_x(), &federations()).unwrap_err();
        assert_eq!(err.to_string(), "[google][iam] permission denied: proj-b");
    }

    #[test]
    fn test_organization_permissions_in_every_target() {
        let provider = ScalewayProvider::new(ScalewaySettings {
            organization_id: Some("org-1".to_string()),
            default_region: Some("fr-par".to_string()),
            default_zone: Some("fr-par-1".to_string()),
            projects: [("main", "id-main"), ("other", "id-other")]
                .into_iter()
                .map(|(name, id)| (name.to_string(), id.to_string()))
                .collect(),
        });
        let mut request = ResolvedRequest::new("svc-x", "main");
        request.linked.insert(
            "other".to_string(),
            LinkedAccess {
                access_level: AccessLevel::Restricted,
                iam_permissions: vec!["SecretManagerReadOnly".to_string()],
            },
        );
        let backend = MockBackend::default();

        provision(&ctx(), &provider, &backend, &request, &BTreeMap::new()).unwrap();

        let grants = backend.grants.lock().unwrap();
        let targets: Vec<_> = grants.iter().map(|g| g.target.id.as_str()).collect();
        assert_eq!(targets, vec!["main", "other"]);
        for grant in grants.iter() {
            assert_eq!(grant.organization_permissions, DEFAULT_ORGANIZATION_PERMISSIONS);
        }
    }
}

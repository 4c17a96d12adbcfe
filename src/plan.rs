//! # Planning Backend
//!
//! An in-memory implementation of every collaborator trait. Instead of
//! calling cloud APIs it records a [`PlannedAction`] per call and hands back
//! deterministic fake identifiers shaped like the real ones, so a complete
//! run can be previewed with `repo-access plan` and asserted on in tests.
//!
//! Failures can be injected per (stage, target) pair with
//! [`PlanBackend::fail_on`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::backend::{
    BranchRuleset, FederatedIdentity, IdentityBackend, JwtRole, MeshClient, MeshClientIssuer,
    MirrorTokenIssuer, PermissionGrant, RepositoryHandle, RepositorySpec, SecretPolicy,
    SecretStore, ServiceIdentity, ServiceIdentityRequest, SourceControl, StorageKey,
    TargetIdentity, VaultAuth,
};
use crate::error::{Error, Result};
use crate::naming::suffix;
use crate::providers::Provider;
use crate::secrets::{SecretMount, SecretPayload};

/// One call the run would make against a real backend.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum PlannedAction {
    CreateRepository {
        repository: String,
        visibility: String,
        allow_deletion: bool,
        import: bool,
    },
    CreateBranchRuleset {
        repository: String,
        patterns: Vec<String>,
    },
    WriteActionsSecret {
        repository: String,
        name: String,
    },
    CreateMount {
        path: String,
    },
    CreatePolicy {
        name: String,
        paths: Vec<String>,
    },
    CreateJwtRole {
        name: String,
        bound_repository: String,
    },
    EnableServices {
        provider: Provider,
        target: String,
        services: Vec<String>,
    },
    CreateFederatedIdentity {
        provider: Provider,
        target: String,
    },
    CreateServiceIdentity {
        provider: Provider,
        target: String,
        name: String,
        subject: Option<String>,
    },
    BindPermissions {
        provider: Provider,
        target: String,
        identity: String,
        grant: String,
        permissions: Vec<String>,
        organization_permissions: Vec<String>,
    },
    CreateStorageKey {
        identity: String,
    },
    WriteSecret {
        mount: String,
        key: String,
    },
    CreateAccessToken {
        name: String,
        group: String,
        scopes: Vec<String>,
    },
    CreateOauthClient {
        description: String,
        scopes: Vec<String>,
    },
}

#[derive(Default)]
pub struct PlanBackend {
    actions: Mutex<Vec<PlannedAction>>,
    secrets: Mutex<BTreeMap<(String, String), SecretPayload>>,
    failures: BTreeSet<(String, String)>,
    imported: Option<BTreeSet<String>>,
}

impl PlanBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call of `stage` against `target`.
    pub fn fail_on(mut self, stage: &str, target: &str) -> Self {
        self.failures.insert((stage.to_string(), target.to_string()));
        self
    }

    /// Only the given repositories count as imported. Without this every
    /// repository is.
    pub fn with_imported<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.imported = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Recorded actions in call order.
    pub fn actions(&self) -> Vec<PlannedAction> {
        match self.actions.lock() {
            Ok(actions) => actions.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Recorded actions in a stable order, independent of thread timing.
    pub fn sorted_actions(&self) -> Vec<PlannedAction> {
        let mut actions = self.actions();
        actions.sort();
        actions
    }

    /// The payload stored at `key` of `mount`.
    pub fn secret(&self, mount: &str, key: &str) -> Option<SecretPayload> {
        let secrets = match self.secrets.lock() {
            Ok(secrets) => secrets,
            Err(poisoned) => poisoned.into_inner(),
        };
        secrets.get(&(mount.to_string(), key.to_string())).cloned()
    }

    /// Stored secret keys, as `mount/key`.
    pub fn secret_keys(&self) -> Vec<String> {
        let secrets = match self.secrets.lock() {
            Ok(secrets) => secrets,
            Err(poisoned) => poisoned.into_inner(),
        };
        secrets
            .keys()
            .map(|(mount, key)| format!("{}/{}", mount, key))
            .collect()
    }

    fn check(&self, provider: Provider, stage: &str, target: &str) -> Result<()> {
        if self
            .failures
            .contains(&(stage.to_string(), target.to_string()))
        {
            return Err(Error::provisioning(provider, stage, target, "planned failure"));
        }
        Ok(())
    }

    fn check_source(&self, stage: &str, repository: &str) -> Result<()> {
        self.check(Provider::GitHub, stage, repository)
            .map_err(|_| Error::SourceControl {
                stage: stage.to_string(),
                repository: repository.to_string(),
                message: "planned failure".to_string(),
            })
    }

    fn record(&self, action: PlannedAction) -> Result<()> {
        lock(&self.actions, "planned actions")?.push(action);
        Ok(())
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, context: &str) -> Result<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| Error::LockPoisoned {
        context: context.to_string(),
    })
}

impl IdentityBackend for PlanBackend {
    fn create_federated_identity(&self, target: &TargetIdentity) -> Result<FederatedIdentity> {
        self.check(target.provider, "identity-provider", &target.id)?;
        self.record(PlannedAction::CreateFederatedIdentity {
            provider: target.provider,
            target: target.id.clone(),
        })?;

        let (id, provider_name) = match target.provider {
            Provider::Aws => (
                format!(
                    "arn:aws:iam::{}:oidc-provider/token.actions.githubusercontent.com",
                    target.id
                ),
                None,
            ),
            Provider::Google => {
                let pool = format!(
                    "projects/{}/locations/global/workloadIdentityPools/github-{}",
                    target.id,
                    suffix(&target.id, 8).to_lowercase()
                );
                let provider_name = format!("{}/providers/github-actions", pool);
                (pool, Some(provider_name))
            }
            other => (format!("{}/{}/github-federation", other, target.id), None),
        };
        Ok(FederatedIdentity {
            provider: target.provider,
            target: target.id.clone(),
            id,
            provider_name,
        })
    }

    fn create_service_identity(&self, request: &ServiceIdentityRequest) -> Result<ServiceIdentity> {
        self.check(request.provider, "service-identity", &request.repository)?;
        self.record(PlannedAction::CreateServiceIdentity {
            provider: request.provider,
            target: request.target.id.clone(),
            name: request.name.clone(),
            subject: request.trust.as_ref().map(|t| t.subject.clone()),
        })?;

        let mut credentials = BTreeMap::new();
        let principal = match request.provider {
            Provider::Aws => format!("arn:aws:iam::{}:role/{}", request.target.id, request.name),
            Provider::Google => format!(
                "{}@{}.iam.gserviceaccount.com",
                request.name, request.target.id
            ),
            Provider::Scaleway => {
                credentials.insert(
                    "access_key".to_string(),
                    format!("SCW{}", suffix(&request.name, 17).to_uppercase()),
                );
                credentials.insert(
                    "secret_key".to_string(),
                    suffix(&format!("{}:secret", request.name), 36).to_lowercase(),
                );
                format!("application/{}", request.name)
            }
            other => format!("{}/{}", other, request.name),
        };
        Ok(ServiceIdentity {
            provider: request.provider,
            name: request.name.clone(),
            principal,
            credentials,
        })
    }

    fn bind_permissions(&self, identity: &ServiceIdentity, grant: &PermissionGrant) -> Result<()> {
        self.check(identity.provider, "iam", &grant.target.id)?;
        self.record(PlannedAction::BindPermissions {
            provider: identity.provider,
            target: grant.target.id.clone(),
            identity: identity.name.clone(),
            grant: grant.name.clone(),
            permissions: grant.permissions.clone(),
            organization_permissions: grant.organization_permissions.clone(),
        })
    }

    fn enable_services(&self, target: &TargetIdentity, services: &[String]) -> Result<()> {
        self.check(target.provider, "services", &target.id)?;
        self.record(PlannedAction::EnableServices {
            provider: target.provider,
            target: target.id.clone(),
            services: services.to_vec(),
        })
    }

    fn create_storage_key(&self, identity: &ServiceIdentity) -> Result<StorageKey> {
        self.check(identity.provider, "storage-key", &identity.name)?;
        self.record(PlannedAction::CreateStorageKey {
            identity: identity.name.clone(),
        })?;
        Ok(StorageKey {
            access_id: format!("GOOG1{}", suffix(&identity.name, 20).to_uppercase()),
            secret: suffix(&format!("{}:hmac", identity.name), 40),
        })
    }
}

impl SecretStore for PlanBackend {
    fn create_mount(&self, path: &str, _description: &str) -> Result<SecretMount> {
        self.check(Provider::Vault, "mount", path)?;
        self.record(PlannedAction::CreateMount {
            path: path.to_string(),
        })?;
        Ok(SecretMount::new(path))
    }

    // Writing an identical payload again records nothing.
    fn write(&self, mount: &SecretMount, key: &str, payload: &SecretPayload) -> Result<()> {
        self.check(Provider::Vault, "secret", &mount.path)?;
        let entry = (mount.path.clone(), key.to_string());
        let changed = {
            let mut secrets = lock(&self.secrets, "planned secrets")?;
            let changed = secrets.get(&entry) != Some(payload);
            if changed {
                secrets.insert(entry, payload.clone());
            }
            changed
        };
        if changed {
            self.record(PlannedAction::WriteSecret {
                mount: mount.path.clone(),
                key: key.to_string(),
            })?;
        }
        Ok(())
    }
}

impl VaultAuth for PlanBackend {
    fn create_policy(&self, policy: &SecretPolicy) -> Result<()> {
        self.check(Provider::Vault, "policy", &policy.name)?;
        self.record(PlannedAction::CreatePolicy {
            name: policy.name.clone(),
            paths: policy.rules.iter().map(|r| r.path.clone()).collect(),
        })
    }

    fn create_jwt_role(&self, role: &JwtRole) -> Result<String> {
        self.check(Provider::Vault, "jwt-role", &role.name)?;
        self.record(PlannedAction::CreateJwtRole {
            name: role.name.clone(),
            bound_repository: role
                .bound_claims
                .get("repository")
                .cloned()
                .unwrap_or_default(),
        })?;
        Ok(role.name.clone())
    }
}

impl SourceControl for PlanBackend {
    fn is_imported(&self, name: &str) -> Result<bool> {
        Ok(self
            .imported
            .as_ref()
            .map_or(true, |imported| imported.contains(name)))
    }

    fn create_repository(&self, spec: &RepositorySpec) -> Result<RepositoryHandle> {
        self.check_source("repository", &spec.name)?;
        self.record(PlannedAction::CreateRepository {
            repository: spec.name.clone(),
            visibility: spec.visibility.to_string(),
            allow_deletion: spec.allow_deletion,
            import: spec.import,
        })?;
        Ok(RepositoryHandle {
            name: spec.name.clone(),
            full_name: spec.name.clone(),
        })
    }

    fn create_branch_ruleset(
        &self,
        repository: &RepositoryHandle,
        ruleset: &BranchRuleset,
    ) -> Result<()> {
        self.check_source("ruleset", &repository.name)?;
        self.record(PlannedAction::CreateBranchRuleset {
            repository: repository.name.clone(),
            patterns: ruleset.patterns.clone(),
        })
    }

    fn write_actions_secret(
        &self,
        repository: &RepositoryHandle,
        name: &str,
        _value: &str,
    ) -> Result<()> {
        self.check_source("actions-secret", &repository.name)?;
        self.record(PlannedAction::WriteActionsSecret {
            repository: repository.name.clone(),
            name: name.to_string(),
        })
    }
}

impl MirrorTokenIssuer for PlanBackend {
    fn create_group_access_token(
        &self,
        name: &str,
        group: &str,
        scopes: &[String],
    ) -> Result<String> {
        self.check(Provider::GitLab, "token", name)?;
        self.record(PlannedAction::CreateAccessToken {
            name: name.to_string(),
            group: group.to_string(),
            scopes: scopes.to_vec(),
        })?;
        Ok(format!("glpat-{}", suffix(&format!("{}:{}", group, name), 20)))
    }
}

impl MeshClientIssuer for PlanBackend {
    fn create_oauth_client(&self, description: &str, scopes: &[String]) -> Result<MeshClient> {
        self.check(Provider::Tailscale, "oauth-client", description)?;
        self.record(PlannedAction::CreateOauthClient {
            description: description.to_string(),
            scopes: scopes.to_vec(),
        })?;
        let id = format!("k{}", suffix(description, 12));
        Ok(MeshClient {
            key: format!("tskey-client-{}-{}", id, suffix(&format!("{}:key", description), 24)),
            id,
        })
    }
}

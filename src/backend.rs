//! # Provisioning Collaborators
//!
//! The run never talks to a cloud API directly. Every side effect goes
//! through one of the traits in this module, which keeps the phases testable
//! with hand-written mocks and lets the `plan` command swap in the in-memory
//! [`PlanBackend`](crate::plan::PlanBackend).
//!
//! ## Traits
//!
//! - **`IdentityBackend`**: federated identities, service identities and
//!   permission bindings for one cloud provider.
//! - **`SecretStore`**: per-repository secret mounts and key/value writes.
//! - **`VaultAuth`**: policies and JWT roles for the secret store itself.
//! - **`SourceControl`**: repositories, branch rulesets and CI secrets.
//! - **`MirrorTokenIssuer`** / **`MeshClientIssuer`**: GitLab group tokens
//!   and Tailscale OAuth clients.
//!
//! All traits are `Send + Sync` because the phases call them from rayon
//! worker threads.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::config::{RulesetConfig, Visibility};
use crate::error::{Error, Result};
use crate::providers::{Provider, TrustCondition};
use crate::secrets::{SecretMount, SecretPayload};

////// IDENTITY //////

/// How the backend reaches a target account or project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TargetAccess {
    /// Use the ambient credentials of the run.
    Ambient,
    /// Assume a role inside the target account first.
    AssumeRole {
        role_arn: String,
        external_id: Option<String>,
    },
    /// Address a project by id inside an organization.
    Project {
        project_id: String,
        organization_id: Option<String>,
    },
}

/// An allow-listed account or project, resolved for one use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetIdentity {
    pub provider: Provider,
    pub id: String,
    pub region: Option<String>,
    pub zone: Option<String>,
    pub access: TargetAccess,
}

/// The OIDC trust object of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FederatedIdentity {
    pub provider: Provider,
    pub target: String,
    pub id: String,
    /// Fully qualified provider name, when it differs from `id`.
    pub provider_name: Option<String>,
}

/// Binds a service identity to a federated identity for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrustBinding {
    pub federation_id: String,
    pub principal: String,
    pub audience: String,
    /// Provider-native form of the subject restriction.
    pub subject: String,
    pub condition: TrustCondition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentityRequest {
    pub provider: Provider,
    pub repository: String,
    pub name: String,
    pub target: TargetIdentity,
    pub description: String,
    /// `None` for providers without federation.
    pub trust: Option<TrustBinding>,
    pub labels: BTreeMap<String, String>,
}

/// A created service identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub provider: Provider,
    pub name: String,
    /// Role ARN, service account email or application id.
    pub principal: String,
    /// Credentials issued together with the identity, if any.
    pub credentials: BTreeMap<String, String>,
}

/// Permissions attached to a service identity inside one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionGrant {
    pub target: TargetIdentity,
    pub name: String,
    pub permissions: Vec<String>,
    pub organization_permissions: Vec<String>,
}

/// A long-lived storage access key.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageKey {
    pub access_id: String,
    pub secret: String,
}

impl StorageKey {
    pub fn into_payload(self) -> SecretPayload {
        SecretPayload::from_pairs([
            ("access_key_id", self.access_id),
            ("secret_access_key", self.secret),
        ])
    }
}

impl std::fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageKey")
            .field("access_id", &self.access_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Cloud identity operations for one provider.
pub trait IdentityBackend: Send + Sync {
    fn create_federated_identity(&self, target: &TargetIdentity) -> Result<FederatedIdentity>;

    fn create_service_identity(&self, request: &ServiceIdentityRequest) -> Result<ServiceIdentity>;

    fn bind_permissions(&self, identity: &ServiceIdentity, grant: &PermissionGrant) -> Result<()>;

    /// Enable provider services inside a target.
    fn enable_services(&self, _target: &TargetIdentity, _services: &[String]) -> Result<()> {
        Ok(())
    }

    fn create_storage_key(&self, identity: &ServiceIdentity) -> Result<StorageKey> {
        Err(Error::provisioning(
            identity.provider,
            "storage-key",
            identity.name.clone(),
            "storage keys are not supported by this provider",
        ))
    }
}

////// SECRET STORE //////

/// The secret store holding one mount per repository.
pub trait SecretStore: Send + Sync {
    fn create_mount(&self, path: &str, description: &str) -> Result<SecretMount>;

    /// Write `payload` at `key`, replacing any existing value.
    fn write(&self, mount: &SecretMount, key: &str, payload: &SecretPayload) -> Result<()>;
}

/// A path rule inside a secret store policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyRule {
    pub path: String,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretPolicy {
    pub name: String,
    pub rules: Vec<PolicyRule>,
}

/// A JWT auth role letting CI tokens log into the secret store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JwtRole {
    pub name: String,
    pub backend: String,
    pub policies: Vec<String>,
    pub bound_audiences: Vec<String>,
    pub user_claim: String,
    pub bound_claims: BTreeMap<String, String>,
    pub token_ttl: u64,
}

/// Auth configuration of the secret store.
pub trait VaultAuth: Send + Sync {
    fn create_policy(&self, policy: &SecretPolicy) -> Result<()>;

    /// Returns the role name as stored by the backend.
    fn create_jwt_role(&self, role: &JwtRole) -> Result<String>;
}

////// SOURCE CONTROL //////

/// Desired state of one source repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySpec {
    pub name: String,
    pub description: String,
    pub visibility: Visibility,
    pub topics: Vec<String>,
    pub homepage: Option<String>,
    pub has_wiki: bool,
    pub has_discussions: bool,
    pub pages_branch: Option<String>,
    /// Whether the backend may delete the repository when it disappears.
    pub allow_deletion: bool,
    /// Adopt an existing repository instead of creating one.
    pub import: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryHandle {
    pub name: String,
    pub full_name: String,
}

/// A branch ruleset with its resolved include patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRuleset {
    pub name: String,
    pub patterns: Vec<String>,
    pub rules: RulesetConfig,
}

pub trait SourceControl: Send + Sync {
    /// Whether the repository already exists under the backend's management.
    fn is_imported(&self, name: &str) -> Result<bool>;

    fn create_repository(&self, spec: &RepositorySpec) -> Result<RepositoryHandle>;

    fn create_branch_ruleset(
        &self,
        repository: &RepositoryHandle,
        ruleset: &BranchRuleset,
    ) -> Result<()>;

    fn write_actions_secret(
        &self,
        repository: &RepositoryHandle,
        name: &str,
        value: &str,
    ) -> Result<()>;
}

////// OTHER ISSUERS //////

/// Issues GitLab group access tokens for repository mirroring.
pub trait MirrorTokenIssuer: Send + Sync {
    fn create_group_access_token(&self, name: &str, group: &str, scopes: &[String])
        -> Result<String>;
}

#[derive(Clone, PartialEq, Eq)]
pub struct MeshClient {
    pub id: String,
    pub key: String,
}

impl std::fmt::Debug for MeshClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshClient")
            .field("id", &self.id)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Issues Tailscale OAuth clients.
pub trait MeshClientIssuer: Send + Sync {
    fn create_oauth_client(&self, description: &str, scopes: &[String]) -> Result<MeshClient>;
}

/// The complete set of collaborators a run needs.
#[derive(Clone)]
pub struct Backends {
    pub aws: Arc<dyn IdentityBackend>,
    pub google: Arc<dyn IdentityBackend>,
    pub scaleway: Arc<dyn IdentityBackend>,
    pub secrets: Arc<dyn SecretStore>,
    pub vault: Arc<dyn VaultAuth>,
    pub source_control: Arc<dyn SourceControl>,
    pub gitlab: Arc<dyn MirrorTokenIssuer>,
    pub tailscale: Arc<dyn MeshClientIssuer>,
}

impl Backends {
    /// Use one implementation for every collaborator.
    pub fn uniform<B>(backend: Arc<B>) -> Self
    where
        B: IdentityBackend
            + SecretStore
            + VaultAuth
            + SourceControl
            + MirrorTokenIssuer
            + MeshClientIssuer
            + 'static,
    {
        Self {
            aws: backend.clone(),
            google: backend.clone(),
            scaleway: backend.clone(),
            secrets: backend.clone(),
            vault: backend.clone(),
            source_control: backend.clone(),
            gitlab: backend.clone(),
            tailscale: backend,
        }
    }

    /// The identity backend of a cloud provider.
    pub fn identity(&self, provider: Provider) -> Option<&dyn IdentityBackend> {
        match provider {
            Provider::Aws => Some(self.aws.as_ref()),
            Provider::Google => Some(self.google.as_ref()),
            Provider::Scaleway => Some(self.scaleway.as_ref()),
            _ => None,
        }
    }
}

//! # Cloud Providers
//!
//! Every cloud provider the run configures implements [`CloudProvider`]. The
//! trait describes *what* a provider needs (its allow list, defaults, naming
//! rules and secret layout) while the generic phases in
//! [`crate::phases::cloud`] decide *when* things happen. The actual resource
//! creation is delegated to an [`IdentityBackend`](crate::backend::IdentityBackend).
//!
//! ## Implementations
//!
//! - [`aws::AwsProvider`]: accounts, GitHub OIDC identity providers and IAM roles.
//! - [`google::GoogleProvider`]: projects, workload identity pools and service
//!   accounts, with optional storage HMAC keys.
//! - [`scaleway::ScalewayProvider`]: projects and IAM applications. Scaleway
//!   has no OIDC federation, so it relies on API keys instead.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backend::{FederatedIdentity, ServiceIdentity, TargetIdentity, TrustBinding};
use crate::config::{LinkedAccess, RepositoryDeclaration, Settings};
use crate::error::Result;
use crate::naming::{self, IdentityName, NameBudget};
use crate::phases::grouping::ResolvedRequest;
use crate::secrets::SecretPayload;

pub mod aws;
pub mod google;
pub mod scaleway;

pub use aws::AwsProvider;
pub use google::GoogleProvider;
pub use scaleway::ScalewayProvider;

/// Every integration a run can touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Google,
    Scaleway,
    Vault,
    GitLab,
    Tailscale,
    GitHub,
}

impl Provider {
    /// The cloud providers configured through [`CloudProvider`].
    pub const CLOUD: [Provider; 3] = [Provider::Aws, Provider::Google, Provider::Scaleway];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Google => "google",
            Provider::Scaleway => "scaleway",
            Provider::Vault => "vault",
            Provider::GitLab => "gitlab",
            Provider::Tailscale => "tailscale",
            Provider::GitHub => "github",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target ids a provider accepts.
pub type AllowList = BTreeSet<String>;

/// A provider-neutral view of one repository's access request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessRequest {
    /// Primary account or project. Absent or empty means "not requested".
    pub target: Option<String>,
    pub region: Option<String>,
    pub zone: Option<String>,
    pub iam_permissions: Vec<String>,
    pub linked: BTreeMap<String, LinkedAccess>,
    pub enabled_services: Vec<String>,
    pub hmac_key: bool,
}

/// Region and zone used when a request does not name its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetDefaults {
    pub region: Option<String>,
    pub zone: Option<String>,
}

/// Restricts a federated binding to exactly one source repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrustCondition {
    pub owner: String,
    pub repository: String,
}

impl TrustCondition {
    pub fn new(owner: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repository: repository.into(),
        }
    }

    /// The `owner/repository` claim a CI token must carry.
    pub fn subject(&self) -> String {
        format!("{}/{}", self.owner, self.repository)
    }

    /// Whether a token's repository claim is allowed through this condition.
    /// Only an exact match passes; prefixes never do.
    pub fn matches(&self, claim: &str) -> bool {
        claim == self.subject()
    }
}

/// Provider-specific knowledge used by the generic cloud phases.
pub trait CloudProvider: Send + Sync {
    fn provider(&self) -> Provider;

    /// Extract this provider's request from a declaration, if any.
    fn access_request(&self, repository: &RepositoryDeclaration) -> Option<AccessRequest>;

    fn allow_list(&self) -> AllowList;

    fn target_defaults(&self) -> TargetDefaults;

    /// Permissions every service identity receives in every target.
    fn default_permissions(&self) -> &'static [&'static str];

    /// Services enabled in every target before federation.
    fn default_services(&self) -> &'static [&'static str] {
        &[]
    }

    /// Permissions granted once at organization scope.
    fn organization_permissions(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether the provider supports OIDC federation.
    fn federates(&self) -> bool {
        true
    }

    fn name_budget(&self) -> NameBudget {
        naming::for_provider(self.provider())
    }

    /// Describe how to reach `target`, falling back to provider defaults for
    /// region and zone.
    fn target_identity(
        &self,
        target: &str,
        region: Option<&str>,
        zone: Option<&str>,
    ) -> Result<TargetIdentity>;

    /// Build the trust binding letting `condition`'s repository assume a
    /// service identity through `federation`. `None` when the provider does
    /// not federate.
    fn trust_binding(
        &self,
        _federation: &FederatedIdentity,
        _condition: &TrustCondition,
    ) -> Option<TrustBinding> {
        None
    }

    /// Name of the permission grant attached to a service identity in `target`.
    fn grant_name(&self, name: &IdentityName, target: &str) -> String;

    /// Key of the secret record this provider writes.
    fn secret_key(&self) -> &'static str;

    fn secret_payload(
        &self,
        request: &ResolvedRequest,
        target: &TargetIdentity,
        federation: Option<&FederatedIdentity>,
        identity: &ServiceIdentity,
    ) -> SecretPayload;

    /// Whether a long-lived storage key is issued for this request.
    fn storage_key_enabled(&self, _request: &ResolvedRequest) -> bool {
        false
    }
}

/// Every cloud provider, configured from `settings`, in [`Provider::CLOUD`] order.
pub fn cloud_providers(settings: &Settings) -> Vec<Box<dyn CloudProvider>> {
    vec![
        Box::new(AwsProvider::new(settings.aws.clone())),
        Box::new(GoogleProvider::new(settings.google.clone())),
        Box::new(ScalewayProvider::new(settings.scaleway.clone())),
    ]
}

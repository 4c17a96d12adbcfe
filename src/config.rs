//! # Configuration Schema and Parsing
//!
//! This module defines the data structures that represent the `repo-access`
//! settings file and the per-repository declaration files, together with the
//! functions that parse them.
//!
//! ## Key Components
//!
//! - **`Settings`**: The global settings file. It names the repository owner
//!   and, for every cloud provider, the allow-listed accounts or projects and
//!   the provider defaults (region, zone, feature flags).
//!
//! - **`RepositoryDeclaration`**: One declared repository. Besides the GitHub
//!   repository attributes it carries an optional `AccessPermissions` block
//!   with one independent request per provider.
//!
//! - **Eligibility helpers**: Small predicates on `RepositoryDeclaration`
//!   (`wants_vault`, `wants_gitlab`, ...) that are shared by provisioning and
//!   by the exported integration flags, so both always agree.
//!
//! Keys use camelCase in YAML, matching the files the repository owner
//! already maintains.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

////// SETTINGS //////

/// Global settings for a provisioning run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Deployment environment name, used for labels.
    #[serde(default)]
    pub environment: Option<String>,
    /// Repository ownership settings.
    pub repositories: RepositoriesSettings,
    /// AWS accounts and defaults.
    #[serde(default)]
    pub aws: AwsSettings,
    /// Google Cloud projects and defaults.
    #[serde(default)]
    pub google: GoogleSettings,
    /// Scaleway projects and defaults.
    #[serde(default)]
    pub scaleway: ScalewaySettings,
    /// Vault connection settings.
    #[serde(default)]
    pub vault: VaultSettings,
}

/// Settings shared by every declared repository.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoriesSettings {
    /// The GitHub user or organization owning all repositories.
    pub owner: String,
    /// The GitHub subscription plan (`none` when on the free plan).
    #[serde(default)]
    pub subscription: Option<String>,
}

impl RepositoriesSettings {
    /// Whether the owner has a paid subscription.
    pub fn has_subscription(&self) -> bool {
        matches!(self.subscription.as_deref(), Some(plan) if plan != "none")
    }
}

/// AWS settings: allow-listed accounts keyed by account id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsSettings {
    #[serde(default)]
    pub default_region: Option<String>,
    #[serde(default)]
    pub account: BTreeMap<String, AwsAccount>,
}

/// How to reach one allow-listed AWS account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsAccount {
    /// Role assumed in the target account to manage its resources.
    #[serde(default)]
    pub role_arn: Option<String>,
    /// External id presented when assuming `role_arn`.
    #[serde(default)]
    pub external_id: Option<String>,
}

/// Google Cloud settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleSettings {
    #[serde(default)]
    pub default_region: Option<String>,
    /// Allow-listed project ids.
    #[serde(default)]
    pub projects: Vec<String>,
    /// Whether repositories may request storage HMAC keys at all.
    #[serde(default)]
    pub allow_hmac_keys: bool,
}

/// Scaleway settings. Projects map a project name to its id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalewaySettings {
    #[serde(default, alias = "organizationID")]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub default_region: Option<String>,
    #[serde(default)]
    pub default_zone: Option<String>,
    #[serde(default)]
    pub projects: BTreeMap<String, String>,
}

/// Vault connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub address: Option<String>,
}

impl Settings {
    /// Parse settings from a YAML string and validate them.
    pub fn parse(yaml: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(yaml).map_err(|e| Error::ConfigParse {
            message: e.to_string(),
            hint: Some("check the settings file against the documented layout".to_string()),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read and parse the settings file at `path`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.repositories.owner.trim().is_empty() {
            return Err(Error::ConfigParse {
                message: "repositories.owner must not be empty".to_string(),
                hint: Some("Add 'owner: <github user or organization>'".to_string()),
            });
        }
        if let Some(address) = &self.vault.address {
            url::Url::parse(address)?;
        }
        Ok(())
    }
}

////// REPOSITORY DECLARATIONS //////

/// Visibility of a GitHub repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Private => write!(f, "private"),
        }
    }
}

/// Access level granted in a linked target.
///
/// Only the literal `full` selects [`AccessLevel::Full`]; any other value,
/// including an absent one, is restricted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessLevel {
    Full,
    #[default]
    Restricted,
}

impl<'de> Deserialize<'de> for AccessLevel {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_yaml::Value::deserialize(deserializer)?;
        Ok(match value.as_str() {
            Some("full") => AccessLevel::Full,
            _ => AccessLevel::Restricted,
        })
    }
}

impl Serialize for AccessLevel {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            AccessLevel::Full => serializer.serialize_str("full"),
            AccessLevel::Restricted => serializer.serialize_str("restricted"),
        }
    }
}

/// Access requested in a linked (secondary) account or project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedAccess {
    #[serde(default)]
    pub access_level: AccessLevel,
    #[serde(default)]
    pub iam_permissions: Vec<String>,
}

/// AWS access request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsAccess {
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub iam_permissions: Vec<String>,
}

/// Google Cloud access request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleAccess {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub iam_permissions: Vec<String>,
    #[serde(default)]
    pub linked_projects: BTreeMap<String, LinkedAccess>,
    #[serde(default)]
    pub enabled_services: Vec<String>,
    #[serde(default)]
    pub hmac_key: bool,
}

/// Scaleway access request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalewayAccess {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub iam_permissions: Vec<String>,
    #[serde(default)]
    pub linked_projects: BTreeMap<String, LinkedAccess>,
}

/// Vault access request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultAccess {
    /// Defaults to enabled when absent.
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Overrides the settings' vault address in the published secret.
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub additional_mounts: Vec<AdditionalMount>,
}

/// An extra vault mount the repository's CI may access.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalMount {
    pub path: String,
    /// Create the mount if it does not exist yet.
    #[serde(default)]
    pub create: bool,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// GitLab mirror token request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitLabAccess {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Per-provider access requests of one repository. Every entry is optional
/// and independent from the others.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPermissions {
    #[serde(default)]
    pub aws: Option<AwsAccess>,
    #[serde(default)]
    pub google: Option<GoogleAccess>,
    #[serde(default)]
    pub scaleway: Option<ScalewayAccess>,
    #[serde(default)]
    pub vault: Option<VaultAccess>,
    #[serde(default)]
    pub gitlab: Option<GitLabAccess>,
    #[serde(default)]
    pub tailscale: bool,
}

/// Branch or tag protection rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesetConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub restrict_creation: Option<bool>,
    #[serde(default)]
    pub allow_force_push: Option<bool>,
    #[serde(default)]
    pub require_conversation_resolution: Option<bool>,
    #[serde(default)]
    pub require_signed_commits: Option<bool>,
    #[serde(default)]
    pub require_code_owner_review: Option<bool>,
    #[serde(default)]
    pub approving_review_count: Option<u32>,
    #[serde(default)]
    pub require_last_push_approval: Option<bool>,
    #[serde(default)]
    pub require_updated_branch_before_merge: Option<bool>,
    #[serde(default)]
    pub enable_merge_queue: Option<bool>,
    #[serde(default)]
    pub required_checks: Vec<String>,
    #[serde(default)]
    pub allow_bypass: Option<bool>,
    #[serde(default)]
    pub allow_bypass_integrations: Vec<u64>,
    #[serde(default)]
    pub enable_wip_integration: Option<bool>,
}

/// Rulesets of a repository.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesetsConfig {
    #[serde(default)]
    pub branch: Option<RulesetConfig>,
    #[serde(default)]
    pub tag: Option<RulesetConfig>,
}

/// One declared repository. Read once at startup and never mutated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryDeclaration {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Defaults to managed when absent.
    #[serde(default)]
    pub manage_lifecycle: Option<bool>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub enable_wiki: bool,
    #[serde(default)]
    pub enable_discussions: bool,
    #[serde(default)]
    pub pages_branch: Option<String>,
    #[serde(default)]
    pub rulesets: RulesetsConfig,
    #[serde(default)]
    pub access_permissions: AccessPermissions,
}

impl RepositoryDeclaration {
    /// Create a bare public declaration with no access requests.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn manages_lifecycle(&self) -> bool {
        self.manage_lifecycle.unwrap_or(true)
    }

    pub fn is_private(&self) -> bool {
        self.visibility == Visibility::Private
    }

    /// Vault mount and auth are created for managed repositories unless the
    /// repository opts out.
    pub fn wants_vault(&self) -> bool {
        let enabled = self
            .access_permissions
            .vault
            .as_ref()
            .and_then(|vault| vault.enabled)
            .unwrap_or(true);
        self.manages_lifecycle() && enabled
    }

    pub fn wants_gitlab(&self) -> bool {
        self.access_permissions
            .gitlab
            .as_ref()
            .is_some_and(|gitlab| !gitlab.scopes.is_empty())
    }

    pub fn wants_tailscale(&self) -> bool {
        self.access_permissions.tailscale
    }

    /// Additional vault mounts this repository asks to be created.
    pub fn created_mounts(&self) -> impl Iterator<Item = &AdditionalMount> {
        self.access_permissions
            .vault
            .iter()
            .flat_map(|vault| vault.additional_mounts.iter())
            .filter(|mount| mount.create)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS: &str = r#"
environment: prod
repositories:
  owner: example
  subscription: none
aws:
  defaultRegion: eu-west-1
  account:
    "111111111111":
      roleArn: arn:aws:iam::111111111111:role/admin
      externalId: ext
google:
  defaultRegion: europe-west4
  projects: [proj-a, proj-b]
  allowHmacKeys: true
scaleway:
  organizationID: org-1
  defaultRegion: fr-par
  defaultZone: fr-par-1
  projects:
    main: 11111111-2222
vault:
  enabled: true
  address: https://vault.example.com
"#;

    #[test]
    fn test_parse_settings() {
        let settings = Settings::parse(SETTINGS).unwrap();
        assert_eq!(settings.repositories.owner, "example");
        assert!(!settings.repositories.has_subscription());
        assert_eq!(settings.aws.default_region.as_deref(), Some("eu-west-1"));
        assert!(settings.aws.account.contains_key("111111111111"));
        assert_eq!(settings.google.projects, vec!["proj-a", "proj-b"]);
        assert!(settings.google.allow_hmac_keys);
        assert_eq!(settings.scaleway.organization_id.as_deref(), Some("org-1"));
        assert_eq!(
            settings.scaleway.projects.get("main").map(String::as_str),
            Some("11111111-2222")
        );
        assert!(settings.vault.enabled);
    }

    #[test]
    fn test_parse_settings_requires_owner() {
        let err = Settings::parse("repositories:\n  owner: ''\n").unwrap_err();
        assert!(err.to_string().contains("repositories.owner"));
    }

    #[test]
    fn test_parse_settings_rejects_bad_vault_address() {
        let yaml = "repositories:\n  owner: me\nvault:\n  address: 'not a url'\n";
        assert!(matches!(
            Settings::parse(yaml).unwrap_err(),
            Error::UrlParse(_)
        ));
    }

    #[test]
    fn test_has_subscription() {
        let mut repos = RepositoriesSettings {
            owner: "me".to_string(),
            subscription: None,
        };
        assert!(!repos.has_subscription());
        repos.subscription = Some("pro".to_string());
        assert!(repos.has_subscription());
    }

    #[test]
    fn test_declaration_defaults() {
        let decl: RepositoryDeclaration = serde_yaml::from_str("name: svc-x\n").unwrap();
        assert_eq!(decl.visibility, Visibility::Public);
        assert!(decl.manages_lifecycle());
        assert!(decl.wants_vault());
        assert!(!decl.wants_gitlab());
        assert!(!decl.wants_tailscale());
    }

    #[test]
    fn test_access_level_parsing() {
        let yaml = r#"
name: svc-x
accessPermissions:
  google:
    project: proj-a
    linkedProjects:
      proj-b:
        accessLevel: full
      proj-c:
        accessLevel: read
      proj-d: {}
      proj-e:
        accessLevel: 1
      proj-f:
        accessLevel: true
      proj-g:
        accessLevel: [full]
"#;
        let decl: RepositoryDeclaration = serde_yaml::from_str(yaml).unwrap();
        let linked = &decl.access_permissions.google.unwrap().linked_projects;
        assert_eq!(linked["proj-b"].access_level, AccessLevel::Full);
        assert_eq!(linked["proj-c"].access_level, AccessLevel::Restricted);
        assert_eq!(linked["proj-d"].access_level, AccessLevel::Restricted);
        assert_eq!(linked["proj-e"].access_level, AccessLevel::Restricted);
        assert_eq!(linked["proj-f"].access_level, AccessLevel::Restricted);
        assert_eq!(linked["proj-g"].access_level, AccessLevel::Restricted);
    }

    #[test]
    fn test_wants_vault_respects_lifecycle_and_opt_out() {
        let mut decl = RepositoryDeclaration::new("svc-x");
        decl.manage_lifecycle = Some(false);
        assert!(!decl.wants_vault());

        decl.manage_lifecycle = None;
        decl.access_permissions.vault = Some(VaultAccess {
            enabled: Some(false),
            ..Default::default()
        });
        assert!(!decl.wants_vault());
    }

    #[test]
    fn test_wants_gitlab_needs_scopes() {
        let mut decl = RepositoryDeclaration::new("svc-x");
        decl.access_permissions.gitlab = Some(GitLabAccess {
            group: "mirrors".to_string(),
            scopes: vec![],
        });
        assert!(!decl.wants_gitlab());
        decl.access_permissions.gitlab = Some(GitLabAccess {
            group: "mirrors".to_string(),
            scopes: vec!["read_repository".to_string()],
        });
        assert!(decl.wants_gitlab());
    }

    #[test]
    fn test_created_mounts_filters_on_create() {
        let yaml = r#"
name: svc-x
accessPermissions:
  vault:
    additionalMounts:
      - path: shared
        create: true
        permissions: [read]
      - path: existing
        permissions: [read, list]
"#;
        let decl: RepositoryDeclaration = serde_yaml::from_str(yaml).unwrap();
        let created: Vec<_> = decl.created_mounts().map(|m| m.path.as_str()).collect();
        assert_eq!(created, vec!["shared"]);
    }
}

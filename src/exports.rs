//! Outputs published at the end of a run.
//!
//! The integration flags are derived from the declarations with the same
//! eligibility rules the phases use, not from what was actually created.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::RepositoryDeclaration;
use crate::providers::AllowList;
use crate::registry::Registry;

/// Allowed and configured targets of one cloud provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderOutputs {
    pub allowed: Vec<String>,
    /// Target id to the repositories provisioned in it.
    pub configured: BTreeMap<String, Vec<String>>,
}

impl ProviderOutputs {
    pub fn new(allowed: &AllowList, configured: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            allowed: allowed.iter().cloned().collect(),
            configured,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GitLabOutputs {
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TailscaleOutputs {
    pub clients: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VaultOutputs {
    pub projects: Vec<String>,
}

/// Which integrations a repository takes part in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IntegrationFlags {
    pub gitlab: bool,
    pub google: bool,
    pub gcs: bool,
    pub aws: bool,
    pub vault: bool,
    pub tailscale: bool,
}

impl IntegrationFlags {
    pub fn of(repository: &RepositoryDeclaration) -> Self {
        let access = &repository.access_permissions;
        Self {
            gitlab: repository.wants_gitlab(),
            google: access
                .google
                .as_ref()
                .is_some_and(|google| google.project.is_some()),
            gcs: access.google.as_ref().is_some_and(|google| google.hmac_key),
            aws: access.aws.as_ref().is_some_and(|aws| aws.account.is_some()),
            vault: repository.wants_vault(),
            tailscale: repository.wants_tailscale(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunOutputs {
    pub aws: ProviderOutputs,
    pub google: ProviderOutputs,
    pub scaleway: ProviderOutputs,
    pub gitlab: GitLabOutputs,
    pub tailscale: TailscaleOutputs,
    pub vault: VaultOutputs,
    pub repositories: BTreeMap<String, IntegrationFlags>,
}

pub fn integration_flags(registry: &Registry) -> BTreeMap<String, IntegrationFlags> {
    registry
        .iter()
        .map(|repository| (repository.name.clone(), IntegrationFlags::of(repository)))
        .collect()
}

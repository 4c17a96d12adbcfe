//! Implementation of the provisioning run, one module per stage.
//!
//! ## Overview
//!
//! A run proceeds in the following stages:
//! 1. Source repositories - ensure every declared repository exists (`github`)
//! 2. Secret stores - one mount and auth role per repository (`vault`)
//! 3. Provider fan-out - AWS, Google and Scaleway run in parallel, together
//!    with GitLab and Tailscale. Each cloud provider goes through:
//!    - Grouping - accept or reject every request against the allow list
//!    - Federation - one federated identity per distinct target, all created
//!      before any repository is provisioned
//!    - Identity - one service identity per accepted repository
//!    - Publication - secret records written into the repository's mount
//! 4. Outputs - allowed and configured targets plus integration flags
//!
//! Stages 1 and 2 are fatal on failure. Inside stage 3 a failed federation
//! aborts only its provider and a failed repository aborts only itself.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::Error;
use crate::providers::Provider;

use self::grouping::ValidationReport;

pub mod cloud;
pub mod federation;
pub mod github;
pub mod gitlab;
pub mod grouping;
pub mod identity;
pub mod orchestrator;
pub mod publication;
pub mod tailscale;
pub mod vault;

/// A non-fatal failure recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub provider: Provider,
    /// `None` when the whole provider was aborted.
    pub repository: Option<String>,
    pub error: String,
}

impl Failure {
    pub fn repository(provider: Provider, repository: impl Into<String>, error: &Error) -> Self {
        Self {
            provider,
            repository: Some(repository.into()),
            error: error.to_string(),
        }
    }

    pub fn provider(provider: Provider, error: &Error) -> Self {
        Self {
            provider,
            repository: None,
            error: error.to_string(),
        }
    }
}

/// What one provider's pass produced.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderReport {
    pub provider: Provider,
    /// Target id to the repositories provisioned in it, sorted.
    pub configured: BTreeMap<String, Vec<String>>,
    /// Repositories fully provisioned by this provider.
    pub repositories: BTreeSet<String>,
    pub validation: ValidationReport,
    pub failures: Vec<Failure>,
    /// Set when the provider's pass was aborted.
    pub aborted: Option<Failure>,
}

impl ProviderReport {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            configured: BTreeMap::new(),
            repositories: BTreeSet::new(),
            validation: ValidationReport::default(),
            failures: Vec::new(),
            aborted: None,
        }
    }

    /// Record a repository as provisioned in `targets`.
    pub fn record_success<'a>(
        &mut self,
        repository: &str,
        targets: impl IntoIterator<Item = &'a str>,
    ) {
        for target in targets {
            let repositories = self.configured.entry(target.to_string()).or_default();
            if !repositories.iter().any(|r| r == repository) {
                repositories.push(repository.to_string());
                repositories.sort();
            }
        }
        self.repositories.insert(repository.to_string());
    }

    pub fn record_failure(&mut self, repository: &str, error: &Error) {
        self.failures
            .push(Failure::repository(self.provider, repository, error));
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.aborted.is_none()
    }
}

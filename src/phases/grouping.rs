//! # Account/Project Grouping
//!
//! Decides, per provider, which repositories are provisioned and in which
//! targets. Every repository ends up in exactly one of three outcomes:
//!
//! - **Not requested**: no request for this provider, or no primary target.
//! - **Accepted**: the primary target and every linked target are allow-listed.
//! - **Rejected**: some target is not allow-listed. The whole request is
//!   dropped for this provider; nothing is partially provisioned.
//!
//! Rejections are logged at error level and collected into a
//! [`ValidationReport`] so callers can inspect them. The grouping itself is a
//! pure function of the configuration.

use std::collections::{BTreeMap, BTreeSet};

use log::error;
use serde::Serialize;
use thiserror::Error;

use crate::config::{LinkedAccess, RepositoryDeclaration};
use crate::permissions::{resolve_services, TargetRole};
use crate::providers::{CloudProvider, Provider};

/// An accepted request with region and zone resolved against the provider
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedRequest {
    pub repository: String,
    /// Primary target.
    pub target: String,
    pub region: Option<String>,
    pub zone: Option<String>,
    pub iam_permissions: Vec<String>,
    pub linked: BTreeMap<String, LinkedAccess>,
    pub enabled_services: Vec<String>,
    pub hmac_key: bool,
}

impl ResolvedRequest {
    pub fn new(repository: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            target: target.into(),
            ..Default::default()
        }
    }

    /// Primary target first, then linked targets in order. A linked entry
    /// naming the primary target is not repeated.
    pub fn targets(&self) -> Vec<&str> {
        std::iter::once(self.target.as_str())
            .chain(
                self.linked
                    .keys()
                    .map(String::as_str)
                    .filter(|t| *t != self.target),
            )
            .collect()
    }

    pub fn role_of(&self, target: &str) -> Option<TargetRole<'_>> {
        if target == self.target {
            Some(TargetRole::Primary)
        } else {
            self.linked.get(target).map(TargetRole::Linked)
        }
    }
}

/// Why a request was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ValidationError {
    #[error("[{provider}][{target}] the repository references an unconfigured target: {repository}")]
    UnknownTarget {
        provider: Provider,
        repository: String,
        target: String,
    },

    #[error("[{provider}][{target}] the repository references an unconfigured linked target: {repository}")]
    UnknownLinkedTarget {
        provider: Provider,
        repository: String,
        target: String,
    },
}

impl ValidationError {
    pub fn repository(&self) -> &str {
        match self {
            ValidationError::UnknownTarget { repository, .. }
            | ValidationError::UnknownLinkedTarget { repository, .. } => repository,
        }
    }

    pub fn provider(&self) -> Provider {
        match self {
            ValidationError::UnknownTarget { provider, .. }
            | ValidationError::UnknownLinkedTarget { provider, .. } => *provider,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    NotRequested,
    Accepted(ResolvedRequest),
    Rejected(ValidationError),
}

/// Rejected requests of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationReport {
    rejections: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn push(&mut self, rejection: ValidationError) {
        self.rejections.push(rejection);
    }

    pub fn extend(&mut self, other: ValidationReport) {
        self.rejections.extend(other.rejections);
    }

    pub fn rejections(&self) -> &[ValidationError] {
        &self.rejections
    }

    pub fn is_empty(&self) -> bool {
        self.rejections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rejections.len()
    }

    /// Whether `repository` was rejected by `provider`.
    pub fn rejected(&self, provider: Provider, repository: &str) -> bool {
        self.rejections
            .iter()
            .any(|r| r.provider() == provider && r.repository() == repository)
    }
}

/// The grouping of one provider.
#[derive(Debug, Clone)]
pub struct Grouping {
    pub provider: Provider,
    /// Every referenced target with the repositories needing it, as primary
    /// or as linked target.
    pub targets: BTreeMap<String, BTreeSet<String>>,
    /// Accepted requests by repository name.
    pub requests: BTreeMap<String, ResolvedRequest>,
    pub report: ValidationReport,
}

impl Grouping {
    /// Distinct targets, each listed once.
    pub fn distinct_targets(&self) -> Vec<&str> {
        self.targets.keys().map(String::as_str).collect()
    }
}

/// Validate one repository's request against the provider's allow list.
pub fn resolve_request(
    provider: &dyn CloudProvider,
    repository: &RepositoryDeclaration,
) -> RequestOutcome {
    let Some(request) = provider.access_request(repository) else {
        return RequestOutcome::NotRequested;
    };
    let Some(target) = request.target.filter(|t| !t.is_empty()) else {
        return RequestOutcome::NotRequested;
    };

    let allow_list = provider.allow_list();
    if !allow_list.contains(&target) {
        return RequestOutcome::Rejected(ValidationError::UnknownTarget {
            provider: provider.provider(),
            repository: repository.name.clone(),
            target,
        });
    }
    if let Some(linked) = request.linked.keys().find(|t| !allow_list.contains(*t)) {
        return RequestOutcome::Rejected(ValidationError::UnknownLinkedTarget {
            provider: provider.provider(),
            repository: repository.name.clone(),
            target: linked.clone(),
        });
    }

    let defaults = provider.target_defaults();
    RequestOutcome::Accepted(ResolvedRequest {
        repository: repository.name.clone(),
        target,
        region: request.region.or(defaults.region),
        zone: request.zone.or(defaults.zone),
        iam_permissions: request.iam_permissions,
        linked: request.linked,
        enabled_services: request.enabled_services,
        hmac_key: request.hmac_key,
    })
}

/// Group every repository by the targets it needs.
pub fn group_repositories(
    provider: &dyn CloudProvider,
    repositories: &[RepositoryDeclaration],
) -> Grouping {
    let mut grouping = Grouping {
        provider: provider.provider(),
        targets: BTreeMap::new(),
        requests: BTreeMap::new(),
        report: ValidationReport::default(),
    };

    for repository in repositories {
        match resolve_request(provider, repository) {
            RequestOutcome::NotRequested => {}
            RequestOutcome::Rejected(rejection) => {
                error!("{}", rejection);
                grouping.report.push(rejection);
            }
            RequestOutcome::Accepted(request) => {
                for target in request.targets() {
                    grouping
                        .targets
                        .entry(target.to_string())
                        .or_default()
                        .insert(request.repository.clone());
                }
                grouping
                    .requests
                    .insert(request.repository.clone(), request);
            }
        }
    }

    grouping
}

/// Services to enable per target: the union over every repository touching
/// it. Providers without default services get an empty map.
pub fn target_services(
    provider: &dyn CloudProvider,
    grouping: &Grouping,
) -> BTreeMap<String, BTreeSet<String>> {
    let defaults = provider.default_services();
    if defaults.is_empty() {
        return BTreeMap::new();
    }

    let mut services: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for request in grouping.requests.values() {
        for target in request.targets() {
            let Some(role) = request.role_of(target) else {
                continue;
            };
            services
                .entry(target.to_string())
                .or_default()
                .extend(resolve_services(&request.enabled_services, role, defaults));
        }
    }
    services
}

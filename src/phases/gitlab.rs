//! GitLab group access tokens for repositories mirrored to GitLab.

use std::collections::BTreeMap;

use log::{error, info};
use rayon::prelude::*;

use crate::backend::{MirrorTokenIssuer, SecretStore};
use crate::config::RepositoryDeclaration;
use crate::error::Result;
use crate::providers::Provider;
use crate::registry::Registry;
use crate::secrets::{publish_secret, SecretMount, SecretPayload};

use super::ProviderReport;

pub const SECRET_KEY: &str = "gitlab";

/// Issue one token per repository with GitLab scopes and publish it.
pub fn configure(
    registry: &Registry,
    issuer: &dyn MirrorTokenIssuer,
    store: &dyn SecretStore,
    mounts: &BTreeMap<String, SecretMount>,
) -> ProviderReport {
    let repositories: Vec<&RepositoryDeclaration> =
        registry.iter().filter(|repo| repo.wants_gitlab()).collect();

    let results: Vec<(String, Result<()>)> = repositories
        .par_iter()
        .map(|repository| {
            let result = issue_token(repository, issuer, store, mounts.get(&repository.name));
            (repository.name.clone(), result)
        })
        .collect();

    let mut report = ProviderReport::new(Provider::GitLab);
    for (repository, result) in results {
        match result {
            Ok(()) => report.record_success(&repository, std::iter::empty()),
            Err(e) => {
                error!(
                    "[gitlab][configure] error creating access token: {} - {}",
                    repository, e
                );
                report.record_failure(&repository, &e);
            }
        }
    }
    info!("[gitlab][configure] issued {} tokens", report.repositories.len());
    report
}

fn issue_token(
    repository: &RepositoryDeclaration,
    issuer: &dyn MirrorTokenIssuer,
    store: &dyn SecretStore,
    mount: Option<&SecretMount>,
) -> Result<()> {
    let Some(gitlab) = &repository.access_permissions.gitlab else {
        return Ok(());
    };
    let token = issuer.create_group_access_token(&repository.name, &gitlab.group, &gitlab.scopes)?;
    let payload = SecretPayload::from_pairs([("token", token)]);
    publish_secret(
        store,
        mount,
        Provider::GitLab,
        &repository.name,
        SECRET_KEY,
        &payload,
    )?;
    Ok(())
}

//! Tailscale OAuth clients for repositories joining the tailnet from CI.

use std::collections::BTreeMap;

use log::{error, info};
use rayon::prelude::*;

use crate::backend::{MeshClientIssuer, SecretStore};
use crate::error::Result;
use crate::naming;
use crate::providers::Provider;
use crate::registry::Registry;
use crate::secrets::{publish_secret, SecretMount, SecretPayload};

use super::ProviderReport;

pub const SECRET_KEY: &str = "tailscale";
pub const SCOPES: &[&str] = &["all"];

/// Client description: the repository name cut to the description limit.
pub fn client_description(repository: &str) -> String {
    naming::truncate(
        repository,
        naming::for_provider(Provider::Tailscale).max_total_len,
    )
}

pub fn configure(
    registry: &Registry,
    issuer: &dyn MeshClientIssuer,
    store: &dyn SecretStore,
    mounts: &BTreeMap<String, SecretMount>,
) -> ProviderReport {
    let repositories: Vec<&str> = registry
        .iter()
        .filter(|repo| repo.wants_tailscale())
        .map(|repo| repo.name.as_str())
        .collect();

    let results: Vec<(&str, Result<()>)> = repositories
        .par_iter()
        .map(|&repository| {
            (
                repository,
                create_client(repository, issuer, store, mounts.get(repository)),
            )
        })
        .collect();

    let mut report = ProviderReport::new(Provider::Tailscale);
    for (repository, result) in results {
        match result {
            Ok(()) => report.record_success(repository, std::iter::empty()),
            Err(e) => {
                error!(
                    "[tailscale][configure] error creating OAuth client: {} - {}",
                    repository, e
                );
                report.record_failure(repository, &e);
            }
        }
    }
    info!(
        "[tailscale][configure] created {} OAuth clients",
        report.repositories.len()
    );
    report
}

fn create_client(
    repository: &str,
    issuer: &dyn MeshClientIssuer,
    store: &dyn SecretStore,
    mount: Option<&SecretMount>,
) -> Result<()> {
    let scopes: Vec<String> = SCOPES.iter().map(|s| s.to_string()).collect();
    let client = issuer.create_oauth_client(&client_description(repository), &scopes)?;
    let payload = SecretPayload::from_pairs([
        ("oauth_client_id", client.id),
        ("oauth_secret", client.key),
    ]);
    publish_secret(store, mount, Provider::Tailscale, repository, SECRET_KEY, &payload)?;
    Ok(())
}

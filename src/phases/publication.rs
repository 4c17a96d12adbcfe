//! # Secret Publication
//!
//! Fan-in of secret records into repository mounts. Every provider writes
//! its own keys, so writes into the same mount never conflict and need no
//! coordination.

use std::collections::BTreeMap;

use log::error;

use crate::backend::SecretStore;
use crate::error::Result;
use crate::providers::Provider;
use crate::secrets::{publish_secret, SecretMount, SecretPayload};

/// Write `secrets` into `repository`'s mount, if it has one.
///
/// Stops at the first failing write; the error is logged and returned so the
/// caller can mark the repository as failed. Nothing is retried.
pub fn publish_all(
    store: &dyn SecretStore,
    mounts: &BTreeMap<String, SecretMount>,
    provider: Provider,
    repository: &str,
    secrets: &[(String, SecretPayload)],
) -> Result<usize> {
    let mount = mounts.get(repository);
    let mut written = 0;
    for (key, payload) in secrets {
        let published = publish_secret(store, mount, provider, repository, key, payload)
            .inspect_err(|e| error!("{}", e))?;
        if published {
            written += 1;
        }
    }
    Ok(written)
}

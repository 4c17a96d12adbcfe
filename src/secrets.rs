//! Secret records and their publication into repository mounts.

use std::collections::BTreeMap;
use std::fmt;

use log::{debug, warn};
use serde::Serialize;

use crate::backend::SecretStore;
use crate::error::{Error, Result};
use crate::providers::Provider;

/// An opaque key/value bundle written at one key of a repository mount.
#[derive(Clone, Default, PartialEq, Eq, Serialize)]
pub struct SecretPayload(BTreeMap<String, String>);

impl SecretPayload {
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serialized form stored in the secret store.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }
}

// Values are credentials; only keys are ever printed.
impl fmt::Debug for SecretPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

/// A repository's dedicated secret mount.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SecretMount {
    pub path: String,
}

impl SecretMount {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Mount path of a repository's own mount.
    pub fn repository_path(repository: &str) -> String {
        format!("github-{}", repository)
    }
}

/// Write one provider's secret record into a repository mount.
///
/// Returns `Ok(false)` when the repository has no mount (the secret store is
/// disabled for it or not connected); the write is skipped with a warning.
/// Errors are wrapped as [`Error::SecretStore`] and are never retried.
pub fn publish_secret(
    store: &dyn SecretStore,
    mount: Option<&SecretMount>,
    provider: Provider,
    repository: &str,
    key: &str,
    payload: &SecretPayload,
) -> Result<bool> {
    let Some(mount) = mount else {
        warn!(
            "[{}][secret] no secret mount, skipping secret {}: {}",
            provider, key, repository
        );
        return Ok(false);
    };

    store
        .write(mount, key, payload)
        .map_err(|e| Error::SecretStore {
            mount: mount.path.clone(),
            key: key.to_string(),
            message: e.to_string(),
        })?;
    debug!("[{}][secret] wrote secret {}: {}", provider, key, mount.path);
    Ok(true)
}

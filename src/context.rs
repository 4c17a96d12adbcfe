//! The immutable context of one provisioning run.
//!
//! Built once at startup from the settings file and the process environment,
//! then passed by reference into every phase.

use std::collections::BTreeMap;

use crate::config::Settings;

/// Environment variable allowing managed repositories to be deleted.
pub const ALLOW_REPOSITORY_DELETION: &str = "ALLOW_REPOSITORY_DELETION";
/// Environment variable letting unimported, unmanaged repositories through.
pub const IGNORE_UNMANAGED_REPOSITORIES: &str = "IGNORE_UNMANAGED_REPOSITORIES";
/// Environment variable holding the secret store token.
pub const VAULT_TOKEN: &str = "VAULT_TOKEN";

#[derive(Debug, Clone)]
pub struct RunContext {
    pub environment: Option<String>,
    pub settings: Settings,
    pub allow_repository_deletion: bool,
    pub ignore_unmanaged_repositories: bool,
    pub vault_token: Option<String>,
}

impl RunContext {
    /// A context with every toggle off.
    pub fn new(settings: Settings) -> Self {
        Self {
            environment: settings.environment.clone(),
            settings,
            allow_repository_deletion: false,
            ignore_unmanaged_repositories: false,
            vault_token: None,
        }
    }

    pub fn with_repository_deletion(mut self, allow: bool) -> Self {
        self.allow_repository_deletion = allow;
        self
    }

    pub fn with_ignore_unmanaged(mut self, ignore: bool) -> Self {
        self.ignore_unmanaged_repositories = ignore;
        self
    }

    pub fn with_vault_token(mut self, token: Option<String>) -> Self {
        self.vault_token = token;
        self
    }

    pub fn owner(&self) -> &str {
        &self.settings.repositories.owner
    }

    /// The secret store is only used when enabled and a token is present.
    pub fn has_vault_connection(&self) -> bool {
        self.settings.vault.enabled
            && self
                .vault_token
                .as_deref()
                .is_some_and(|token| !token.is_empty())
    }

    /// Labels attached to every created resource.
    pub fn common_labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert("owner".to_string(), self.owner().to_string());
        labels.insert("managed-by".to_string(), env!("CARGO_PKG_NAME").to_string());
        if let Some(environment) = &self.environment {
            labels.insert("environment".to_string(), environment.clone());
        }
        labels
    }
}

/// A boolean toggle is on only when its value is `true`, ignoring case.
pub fn parse_toggle(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

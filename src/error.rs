//! # Error Handling
//!
//! This module defines the centralized error type for `repo-access`. It uses
//! `thiserror` to build one `Error` enum that covers every failure the
//! provisioning run can hit, with enough context in each variant to produce
//! the `[provider][stage] message: target` log shape used across the crate.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum. Configuration problems, provisioning
//!   failures reported by the external collaborators, secret-store writes,
//!   source-control operations and the wrapped library errors all live here.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! Validation outcomes for individual access requests are deliberately *not*
//! part of this enum. They are recoverable and are collected into a
//! [`ValidationReport`](crate::phases::grouping::ValidationReport) instead.

use thiserror::Error;

use crate::providers::Provider;

/// Main error type for repo-access operations
#[derive(Error, Debug)]
pub enum Error {
    /// An error occurred while parsing the settings file or a repository
    /// declaration.
    #[error("Configuration parsing error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// Two declaration files use the same repository name.
    #[error("Duplicate repository declaration: {name} ({first} and {second})")]
    DuplicateRepository {
        name: String,
        first: String,
        second: String,
    },

    /// A repository whose lifecycle is not managed has not been imported into
    /// the source-control backend yet.
    #[error("Repository '{name}' is not imported yet{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    UnmanagedRepository {
        name: String,
        /// Optional hint describing how to import the repository
        hint: Option<String>,
    },

    /// A provisioning collaborator failed to create or update a resource.
    #[error("[{provider}][{stage}] {message}: {target}")]
    Provisioning {
        provider: Provider,
        stage: String,
        target: String,
        message: String,
    },

    /// Writing a secret into a repository mount failed.
    #[error("[vault][secret] error writing secret {key} into mount: {mount} - {message}")]
    SecretStore {
        mount: String,
        key: String,
        message: String,
    },

    /// A source-control operation failed.
    #[error("[github][{stage}] {message}: {repository}")]
    SourceControl {
        stage: String,
        repository: String,
        message: String,
    },

    /// A generated resource name does not satisfy the provider's naming rules.
    #[error("Name budget error: {provider} - {message}")]
    NameBudget { provider: Provider, message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON serialization error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },
}

impl Error {
    /// Shorthand for building a [`Error::Provisioning`] value.
    pub fn provisioning(
        provider: Provider,
        stage: &str,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Provisioning {
            provider,
            stage: stage.to_string(),
            target: target.into(),
            message: message.into(),
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

//! # Resource Name Budgets
//!
//! Cloud providers limit the length and character set of identity names.
//! Rather than truncating ad hoc at every call site, each provider gets a
//! [`NameBudget`] row from one table and every generated name goes through
//! [`NameBudget::identity_name`].
//!
//! Generated names look like `ci-<repository>-<suffix>`: the repository part
//! is cut to the budget, the suffix keeps names distinct when two long
//! repository names share a prefix. The suffix is derived from a SHA-256
//! seed, so the same repository and target always produce the same name.

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::providers::Provider;

/// Naming constraints of one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameBudget {
    pub provider: Provider,
    /// Prepended as `<prefix>-`. Empty for no prefix.
    pub prefix: &'static str,
    pub max_repository_len: usize,
    /// Zero disables the suffix.
    pub suffix_len: usize,
    /// Lowercase the name and replace characters outside `[a-z0-9-]`.
    pub lowercase: bool,
    pub max_total_len: usize,
    /// Full-name pattern the provider enforces, if any.
    pub pattern: Option<&'static str>,
}

/// A generated name and its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityName {
    pub truncated: String,
    pub suffix: String,
    pub full: String,
}

const BUDGETS: [NameBudget; 4] = [
    // IAM role names: 64 characters.
    NameBudget {
        provider: Provider::Aws,
        prefix: "ci",
        max_repository_len: 18,
        suffix_len: 8,
        lowercase: false,
        max_total_len: 64,
        pattern: Some(r"^[A-Za-z0-9+=,.@_-]+$"),
    },
    // Service account ids: 6 to 30 characters.
    NameBudget {
        provider: Provider::Google,
        prefix: "ci",
        max_repository_len: 18,
        suffix_len: 8,
        lowercase: true,
        max_total_len: 30,
        pattern: Some(r"^[a-z]([-a-z0-9]*[a-z0-9])$"),
    },
    NameBudget {
        provider: Provider::Scaleway,
        prefix: "ci",
        max_repository_len: 32,
        suffix_len: 8,
        lowercase: false,
        max_total_len: 64,
        pattern: None,
    },
    // OAuth client descriptions.
    NameBudget {
        provider: Provider::Tailscale,
        prefix: "",
        max_repository_len: 50,
        suffix_len: 0,
        lowercase: false,
        max_total_len: 50,
        pattern: None,
    },
];

/// Budget row of `provider`. Providers without naming rules get a
/// permissive row of their own.
pub fn for_provider(provider: Provider) -> NameBudget {
    BUDGETS
        .iter()
        .copied()
        .find(|budget| budget.provider == provider)
        .unwrap_or(NameBudget {
            provider,
            prefix: "",
            max_repository_len: 100,
            suffix_len: 0,
            lowercase: false,
            max_total_len: 100,
            pattern: None,
        })
}

/// Keep at most `max` characters of `value`.
pub fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Deterministic alphanumeric suffix of `len` characters for `seed`.
pub fn suffix(seed: &str, len: usize) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    let mut rng = StdRng::seed_from_u64(u64::from_le_bytes(bytes));
    (0..len)
        .map(|_| rng.sample(Alphanumeric) as char)
        .collect()
}

impl NameBudget {
    /// Name of the service identity created for `repository` in `target`.
    pub fn identity_name(&self, repository: &str, target: &str) -> Result<IdentityName> {
        let mut truncated = truncate(repository, self.max_repository_len);
        let mut suffix = suffix(
            &format!("{}:{}:{}", self.provider, target, repository),
            self.suffix_len,
        );
        if self.lowercase {
            truncated = sanitize_lowercase(&truncated);
            suffix = suffix.to_lowercase();
        }

        let mut full = String::new();
        if !self.prefix.is_empty() {
            full.push_str(self.prefix);
            full.push('-');
        }
        full.push_str(&truncated);
        if !suffix.is_empty() {
            full.push('-');
            full.push_str(&suffix);
        }

        self.check(&full)?;
        Ok(IdentityName {
            truncated,
            suffix,
            full,
        })
    }

    fn check(&self, name: &str) -> Result<()> {
        if name.is_empty() || name.chars().count() > self.max_total_len {
            return Err(Error::NameBudget {
                provider: self.provider,
                message: format!(
                    "'{}' must be between 1 and {} characters",
                    name, self.max_total_len
                ),
            });
        }
        if let Some(pattern) = self.pattern {
            if !Regex::new(pattern)?.is_match(name) {
                return Err(Error::NameBudget {
                    provider: self.provider,
                    message: format!("'{}' does not match {}", name, pattern),
                });
            }
        }
        Ok(())
    }
}

fn sanitize_lowercase(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '-' => c,
            _ => '-',
        })
        .collect()
}

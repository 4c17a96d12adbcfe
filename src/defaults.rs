//! Default locations for repo-access inputs.
//!
//! Shared by every command so they all read the same files unless told
//! otherwise.

/// Settings file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILENAME: &str = "repo-access.yaml";

/// Directory holding one declaration file per repository.
pub const DEFAULT_REPOSITORIES_DIR: &str = "assets/repositories";

/// Environment variable overriding the settings file.
pub const CONFIG_ENV: &str = "REPO_ACCESS_CONFIG";

/// Environment variable overriding the declarations directory.
pub const REPOSITORIES_ENV: &str = "REPO_ACCESS_REPOSITORIES";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_relative() {
        assert!(std::path::Path::new(DEFAULT_CONFIG_FILENAME).is_relative());
        assert!(std::path::Path::new(DEFAULT_REPOSITORIES_DIR).is_relative());
    }
}

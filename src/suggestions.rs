//! # Error Suggestions
//!
//! Helpers building user-facing errors that say what went wrong and how to
//! fix it.
//!
//! ```rust,ignore
//! use repo_access::suggestions;
//!
//! return Err(suggestions::config_not_found(path));
//! ```

use std::path::Path;

use crate::defaults::{CONFIG_ENV, REPOSITORIES_ENV};
use crate::phases::grouping::ValidationError;
use crate::providers::AllowList;

/// The settings file does not exist.
pub fn config_not_found(path: &Path) -> anyhow::Error {
    anyhow::anyhow!(
        "Settings file not found: {path}\n\n\
         hint: Create a repo-access.yaml with at least 'repositories.owner'\n\
         hint: Use -c/--config to specify a different path\n\
         hint: Set {CONFIG_ENV} environment variable",
        path = path.display()
    )
}

/// The declarations directory does not exist.
pub fn repositories_not_found(path: &Path) -> anyhow::Error {
    anyhow::anyhow!(
        "Repository declarations not found: {path}\n\n\
         hint: Add one <name>.yaml file per repository to that directory\n\
         hint: Use -r/--repositories to specify a different directory\n\
         hint: Set {REPOSITORIES_ENV} environment variable",
        path = path.display()
    )
}

/// A hint for a rejected request, pointing at the closest allowed target.
pub fn rejection_hint(rejection: &ValidationError, allowed: &AllowList) -> String {
    let target = match rejection {
        ValidationError::UnknownTarget { target, .. }
        | ValidationError::UnknownLinkedTarget { target, .. } => target.as_str(),
    };
    let candidates: Vec<&str> = allowed.iter().map(String::as_str).collect();
    match find_similar(target, &candidates) {
        Some(similar) => format!("hint: Did you mean '{similar}'?"),
        None if candidates.is_empty() => {
            format!("hint: No {} targets are configured", rejection.provider())
        }
        None => format!("hint: Allowed targets are: {}", candidates.join(", ")),
    }
}

/// Find the candidate within two edits of `input`, if any.
fn find_similar<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|&candidate| {
            let distance = edit_distance(input, candidate);
            (distance <= 2 && distance < input.len()).then_some((candidate, distance))
        })
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

/// Levenshtein distance over chars.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.iter().enumerate() {
        let mut current = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        previous = current;
    }
    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Provider;

    fn unknown(target: &str) -> ValidationError {
        ValidationError::UnknownTarget {
            provider: Provider::Google,
            repository: "svc-x".to_string(),
            target: target.to_string(),
        }
    }

    fn allowed(targets: &[&str]) -> AllowList {
        targets.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_config_not_found_includes_hints() {
        let message = config_not_found(Path::new("/etc/repo-access.yaml")).to_string();
        assert!(message.contains("/etc/repo-access.yaml"));
        assert!(message.contains("--config"));
        assert!(message.contains(CONFIG_ENV));
    }

    #[test]
    fn test_repositories_not_found_includes_hints() {
        let message = repositories_not_found(Path::new("assets/repositories")).to_string();
        assert!(message.contains("--repositories"));
        assert!(message.contains(REPOSITORIES_ENV));
    }

    #[test]
    fn test_rejection_hint_suggests_typo_fix() {
        let hint = rejection_hint(&unknown("proj-c"), &allowed(&["proj-a", "prod-main"]));
        assert_eq!(hint, "hint: Did you mean 'proj-a'?");
    }

    #[test]
    fn test_rejection_hint_lists_allowed() {
        let hint = rejection_hint(&unknown("unknown-project"), &allowed(&["proj-a", "proj-b"]));
        assert_eq!(hint, "hint: Allowed targets are: proj-a, proj-b");
    }

    #[test]
    fn test_rejection_hint_without_targets() {
        let hint = rejection_hint(&unknown("proj-a"), &AllowList::new());
        assert_eq!(hint, "hint: No google targets are configured");
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("proj-a", "proj-a"), 0);
    }
}

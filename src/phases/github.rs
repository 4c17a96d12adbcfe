//! # Source Repositories
//!
//! Ensures every declared repository exists in source control before any
//! access is provisioned for it. Failures here are fatal for the run.

use std::collections::BTreeMap;

use log::{error, info, warn};

use crate::backend::{BranchRuleset, RepositoryHandle, RepositorySpec, SourceControl};
use crate::config::RepositoryDeclaration;
use crate::context::{RunContext, IGNORE_UNMANAGED_REPOSITORIES};
use crate::error::{Error, Result};
use crate::registry::Registry;

/// Pattern matching whatever the repository's default branch is.
pub const DEFAULT_BRANCH_PATTERN: &str = "~DEFAULT_BRANCH";

/// Ensure every repository and its branch ruleset.
///
/// Returns the created repositories keyed by name.
pub fn ensure_repositories(
    ctx: &RunContext,
    registry: &Registry,
    source_control: &dyn SourceControl,
) -> Result<BTreeMap<String, RepositoryHandle>> {
    let mut handles = BTreeMap::new();
    for repository in registry.iter() {
        match ensure_repository(ctx, repository, source_control) {
            Ok(handle) => {
                handles.insert(repository.name.clone(), handle);
            }
            Err(e) => {
                error!(
                    "[github][repository] error creating repository: {} - {}",
                    repository.name, e
                );
                return Err(e);
            }
        }
    }
    info!("[github][repository] ensured {} repositories", handles.len());
    Ok(handles)
}

fn ensure_repository(
    ctx: &RunContext,
    repository: &RepositoryDeclaration,
    source_control: &dyn SourceControl,
) -> Result<RepositoryHandle> {
    let manages = repository.manages_lifecycle();
    if !manages && !source_control.is_imported(&repository.name)? {
        if !ctx.ignore_unmanaged_repositories {
            return Err(Error::UnmanagedRepository {
                name: repository.name.clone(),
                hint: Some(format!(
                    "import {}/{} into the source control backend and re-run with {}=true",
                    ctx.owner(),
                    repository.name,
                    IGNORE_UNMANAGED_REPOSITORIES
                )),
            });
        }
        warn!(
            "[github][repository] unmanaged repository is not imported, importing anyway: {}",
            repository.name
        );
    }

    let handle = source_control.create_repository(&repository_spec(ctx, repository))?;

    if let Some(ruleset) = branch_ruleset(ctx, repository) {
        source_control.create_branch_ruleset(&handle, &ruleset)?;
        info!(
            "[github][ruleset] created branch ruleset {}: {}",
            ruleset.name, repository.name
        );
    }
    Ok(handle)
}

/// Desired state of a repository.
pub fn repository_spec(ctx: &RunContext, repository: &RepositoryDeclaration) -> RepositorySpec {
    let manages = repository.manages_lifecycle();
    RepositorySpec {
        name: repository.name.clone(),
        description: repository.description.clone(),
        visibility: repository.visibility,
        topics: repository.topics.clone(),
        homepage: repository.homepage.clone(),
        has_wiki: repository.enable_wiki,
        has_discussions: repository.enable_discussions,
        pages_branch: repository.pages_branch.clone(),
        allow_deletion: manages && ctx.allow_repository_deletion,
        import: !manages,
    }
}

/// The branch ruleset of a repository, if one applies.
///
/// Rulesets on private repositories need a paid subscription.
pub fn branch_ruleset(
    ctx: &RunContext,
    repository: &RepositoryDeclaration,
) -> Option<BranchRuleset> {
    let rules = repository.rulesets.branch.as_ref()?;
    if !rules.enabled {
        return None;
    }
    if !ctx.settings.repositories.has_subscription() && repository.is_private() {
        return None;
    }

    let mut patterns = vec![DEFAULT_BRANCH_PATTERN.to_string()];
    patterns.extend(rules.patterns.iter().cloned());
    Some(BranchRuleset {
        name: format!("branch-{}-{}", ctx.owner(), repository.name),
        patterns,
        rules: rules.clone(),
    })
}

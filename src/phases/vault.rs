//! # Secret Stores
//!
//! One secret mount per repository, plus the policy and JWT role its CI uses
//! to log in. The mounts created here are where every provider later
//! publishes its secret records.
//!
//! Mount creation is fatal for the run; auth failures only abort the
//! affected repository.

use std::collections::{BTreeMap, BTreeSet};

use log::{error, info};
use rayon::prelude::*;

use crate::backend::{
    JwtRole, PolicyRule, RepositoryHandle, SecretPolicy, SecretStore, SourceControl, VaultAuth,
};
use crate::config::RepositoryDeclaration;
use crate::context::RunContext;
use crate::error::Result;
use crate::providers::Provider;
use crate::registry::Registry;
use crate::secrets::{publish_secret, SecretMount, SecretPayload};

use super::ProviderReport;

/// JWT auth backend CI tokens log in with.
pub const AUTH_BACKEND: &str = "github";
pub const TOKEN_TTL_SECONDS: u64 = 60 * 60;
pub const SECRET_KEY: &str = "vault";

const MOUNT_CAPABILITIES: &[&str] = &["create", "read", "update", "delete", "list"];

#[derive(Debug, Default)]
pub struct VaultOutcome {
    /// Repository name to its mount.
    pub mounts: BTreeMap<String, SecretMount>,
    pub report: Option<ProviderReport>,
}

/// Create mounts and auth for every eligible repository.
///
/// Does nothing without an active vault connection.
pub fn configure_stores(
    ctx: &RunContext,
    registry: &Registry,
    handles: &BTreeMap<String, RepositoryHandle>,
    store: &dyn SecretStore,
    auth: &dyn VaultAuth,
    source_control: &dyn SourceControl,
) -> Result<VaultOutcome> {
    if !ctx.has_vault_connection() {
        info!("[vault][mount] no vault connection, skipping secret stores");
        return Ok(VaultOutcome::default());
    }

    let eligible: Vec<&RepositoryDeclaration> =
        registry.iter().filter(|repo| repo.wants_vault()).collect();

    let additional: BTreeSet<&str> = eligible
        .iter()
        .flat_map(|repo| repo.created_mounts())
        .map(|mount| mount.path.as_str())
        .collect();
    for path in additional {
        store
            .create_mount(path, &format!("Secrets for: {}", path))
            .inspect_err(|e| error!("[vault][mount] error creating additional mount: {} - {}", path, e))?;
    }

    let mut mounts = BTreeMap::new();
    for repository in &eligible {
        let path = SecretMount::repository_path(&repository.name);
        let description = format!("GitHub repository: {}/{}", ctx.owner(), repository.name);
        let mount = store.create_mount(&path, &description).inspect_err(|e| {
            error!(
                "[vault][mount] error creating mount for repository: {} - {}",
                repository.name, e
            )
        })?;
        mounts.insert(repository.name.clone(), mount);
    }

    let results: Vec<(String, Result<()>)> = eligible
        .par_iter()
        .map(|repository| {
            let result = match (mounts.get(&repository.name), handles.get(&repository.name)) {
                (Some(mount), Some(handle)) => {
                    configure_auth(ctx, repository, mount, handle, store, auth, source_control)
                }
                _ => Ok(()),
            };
            (repository.name.clone(), result)
        })
        .collect();

    let mut report = ProviderReport::new(Provider::Vault);
    for (repository, result) in results {
        match result {
            Ok(()) => report.record_success(&repository, std::iter::empty()),
            Err(e) => {
                error!("[vault][auth] {}: {}", e, repository);
                report.record_failure(&repository, &e);
            }
        }
    }

    info!("[vault][mount] configured {} secret stores", mounts.len());
    Ok(VaultOutcome {
        mounts,
        report: Some(report),
    })
}

fn configure_auth(
    ctx: &RunContext,
    repository: &RepositoryDeclaration,
    mount: &SecretMount,
    handle: &RepositoryHandle,
    store: &dyn SecretStore,
    auth: &dyn VaultAuth,
    source_control: &dyn SourceControl,
) -> Result<()> {
    let policy = repository_policy(repository);
    auth.create_policy(&policy)?;
    let role = auth.create_jwt_role(&jwt_role(ctx, repository, &policy))?;

    let address = vault_address(ctx, repository);
    let payload = SecretPayload::from_pairs([
        ("address", address.as_str()),
        ("role", role.as_str()),
        ("path", AUTH_BACKEND),
    ]);
    publish_secret(
        store,
        Some(mount),
        Provider::Vault,
        &repository.name,
        SECRET_KEY,
        &payload,
    )?;

    for (name, value) in [
        ("VAULT_ADDR", address.as_str()),
        ("VAULT_ROLE", role.as_str()),
        ("VAULT_PATH", AUTH_BACKEND),
    ] {
        source_control.write_actions_secret(handle, name, value)?;
    }
    info!("[vault][auth] configured role {}: {}", role, repository.name);
    Ok(())
}

/// The address CI should log in at, preferring the repository's override.
pub fn vault_address(ctx: &RunContext, repository: &RepositoryDeclaration) -> String {
    repository
        .access_permissions
        .vault
        .as_ref()
        .and_then(|vault| vault.address.clone())
        .filter(|address| !address.is_empty())
        .or_else(|| ctx.settings.vault.address.clone())
        .unwrap_or_default()
}

/// Policy granting the repository's own mount plus its additional mounts.
pub fn repository_policy(repository: &RepositoryDeclaration) -> SecretPolicy {
    let mut rules = vec![PolicyRule {
        path: format!("{}/*", SecretMount::repository_path(&repository.name)),
        capabilities: MOUNT_CAPABILITIES.iter().map(|c| c.to_string()).collect(),
    }];
    if let Some(vault) = &repository.access_permissions.vault {
        rules.extend(vault.additional_mounts.iter().map(|mount| PolicyRule {
            path: format!("{}/*", mount.path),
            capabilities: mount.permissions.clone(),
        }));
    }
    SecretPolicy {
        name: SecretMount::repository_path(&repository.name),
        rules,
    }
}

pub fn jwt_role(
    ctx: &RunContext,
    repository: &RepositoryDeclaration,
    policy: &SecretPolicy,
) -> JwtRole {
    let mut bound_claims = BTreeMap::new();
    bound_claims.insert(
        "repository".to_string(),
        format!("{}/{}", ctx.owner(), repository.name),
    );
    JwtRole {
        name: SecretMount::repository_path(&repository.name),
        backend: AUTH_BACKEND.to_string(),
        policies: vec![policy.name.clone()],
        bound_audiences: vec![format!("https://github.com/{}", ctx.owner())],
        user_claim: "repository".to_string(),
        bound_claims,
        token_ttl: TOKEN_TTL_SECONDS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdditionalMount, Settings, VaultAccess};
    use crate::plan::{PlanBackend, PlannedAction};

    fn ctx() -> RunContext {
        let settings = Settings::parse(
            "repositories:\n  owner: example\nvault:\n  enabled: true\n  address: https://vault.example.com\n",
        )
        .unwrap();
        RunContext::new(settings).with_vault_token(Some("s.token".to_string()))
    }

    fn handles(names: &[&str]) -> BTreeMap<String, RepositoryHandle> {
        names
            .iter()
            .map(|n| {
                (
                    n.to_string(),
                    RepositoryHandle {
                        name: n.to_string(),
                        full_name: format!("example/{}", n),
                    },
                )
            })
            .collect()
    }

    fn with_shared_mount(name: &str) -> RepositoryDeclaration {
        let mut repo = RepositoryDeclaration::new(name);
        repo.access_permissions.vault = Some(VaultAccess {
            additional_mounts: vec![AdditionalMount {
                path: "shared".to_string(),
                create: true,
                permissions: vec!["read".to_string()],
            }],
            ..Default::default()
        });
        repo
    }

    fn run(registry: &Registry, backend: &PlanBackend) -> VaultOutcome {
        let names: Vec<&str> = registry.iter().map(|r| r.name.as_str()).collect();
        configure_stores(&ctx(), registry, &handles(&names), backend, backend, backend).unwrap()
    }

    #[test]
    fn test_without_connection_nothing_happens() {
        let registry = Registry::new(vec![RepositoryDeclaration::new("svc-x")]).unwrap();
        let backend = PlanBackend::new();
        let ctx = ctx().with_vault_token(None);

        let outcome =
            configure_stores(&ctx, &registry, &handles(&["svc-x"]), &backend, &backend, &backend)
                .unwrap();
        assert!(outcome.mounts.is_empty());
        assert!(outcome.report.is_none());
        assert!(backend.actions().is_empty());
    }

    #[test]
    fn test_shared_additional_mount_created_once() {
        let registry =
            Registry::new(vec![with_shared_mount("svc-x"), with_shared_mount("svc-y")]).unwrap();
        let backend = PlanBackend::new();

        let outcome = run(&registry, &backend);

        let mounts: Vec<_> = backend
            .actions()
            .into_iter()
            .filter_map(|a| match a {
                PlannedAction::CreateMount { path } => Some(path),
                _ => None,
            })
            .collect();
        assert_eq!(mounts, vec!["shared", "github-svc-x", "github-svc-y"]);
        assert_eq!(outcome.mounts["svc-x"].path, "github-svc-x");
    }

    #[test]
    fn test_opted_out_and_unmanaged_repositories_have_no_mount() {
        let mut opted_out = RepositoryDeclaration::new("svc-x");
        opted_out.access_permissions.vault = Some(VaultAccess {
            enabled: Some(false),
            ..Default::default()
        });
        let mut unmanaged = RepositoryDeclaration::new("legacy");
        unmanaged.manage_lifecycle = Some(false);
        let registry =
            Registry::new(vec![opted_out, unmanaged, RepositoryDeclaration::new("svc-y")]).unwrap();
        let backend = PlanBackend::new();

        let outcome = run(&registry, &backend);
        assert_eq!(outcome.mounts.keys().collect::<Vec<_>>(), vec!["svc-y"]);
    }

    #[test]
    fn test_auth_secret_and_ci_variables() {
        let registry = Registry::new(vec![RepositoryDeclaration::new("svc-x")]).unwrap();
        let backend = PlanBackend::new();

        let outcome = run(&registry, &backend);

        let report = outcome.report.unwrap();
        assert!(report.is_clean());
        assert!(report.repositories.contains("svc-x"));
        let secret = backend.secret("github-svc-x", "vault").unwrap();
        assert_eq!(secret.get("address"), Some("https://vault.example.com"));
        assert_eq!(secret.get("role"), Some("github-svc-x"));
        assert_eq!(secret.get("path"), Some("github"));
        let variables: Vec<_> = backend
            .actions()
            .into_iter()
            .filter_map(|a| match a {
                PlannedAction::WriteActionsSecret { name, .. } => Some(name),
                _ => None,
            })
            .collect();
        assert_eq!(variables, vec!["VAULT_ADDR", "VAULT_ROLE", "VAULT_PATH"]);
    }

    #[test]
    fn test_role_is_bound_to_repository() {
        let repo = RepositoryDeclaration::new("svc-x");
        let policy = repository_policy(&repo);
        let role = jwt_role(&ctx(), &repo, &policy);
        assert_eq!(role.bound_claims["repository"], "example/svc-x");
        assert_eq!(role.bound_audiences, vec!["https://github.com/example"]);
        assert_eq!(role.policies, vec!["github-svc-x"]);
        assert_eq!(role.token_ttl, 3600);
    }

    #[test]
    fn test_policy_includes_additional_mounts() {
        let policy = repository_policy(&with_shared_mount("svc-x"));
        let paths: Vec<_> = policy.rules.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["github-svc-x/*", "shared/*"]);
        assert_eq!(policy.rules[1].capabilities, vec!["read"]);
    }

    #[test]
    fn test_repository_address_override() {
        let mut repo = RepositoryDeclaration::new("svc-x");
        repo.access_permissions.vault = Some(VaultAccess {
            address: Some("https://other.example.com".to_string()),
            ..Default::default()
        });
        assert_eq!(vault_address(&ctx(), &repo), "https://other.example.com");
        assert_eq!(
            vault_address(&ctx(), &RepositoryDeclaration::new("svc-y")),
            "https://vault.example.com"
        );
    }

    #[test]
    fn test_mount_failure_is_fatal() {
        let registry = Registry::new(vec![RepositoryDeclaration::new("svc-x")]).unwrap();
        let backend = PlanBackend::new().fail_on("mount", "github-svc-x");
        let result = configure_stores(
            &ctx(),
            &registry,
            &handles(&["svc-x"]),
            &backend,
            &backend,
            &backend,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_policy_failure_only_affects_repository() {
        let registry = Registry::new(vec![
            RepositoryDeclaration::new("svc-x"),
            RepositoryDeclaration::new("svc-y"),
        ])
        .unwrap();
        let backend = PlanBackend::new().fail_on("policy", "github-svc-x");

        let outcome = run(&registry, &backend);
        let report = outcome.report.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(report.repositories.contains("svc-y"));
        assert_eq!(outcome.mounts.len(), 2);
    }
}

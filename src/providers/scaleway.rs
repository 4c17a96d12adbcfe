//! Scaleway: no OIDC federation exists, so every repository gets an IAM
//! application with an API key, plus policies in its projects and at
//! organization scope.

use crate::backend::{FederatedIdentity, ServiceIdentity, TargetAccess, TargetIdentity};
use crate::config::{RepositoryDeclaration, ScalewaySettings};
use crate::error::{Error, Result};
use crate::naming::IdentityName;
use crate::phases::grouping::ResolvedRequest;
use crate::secrets::SecretPayload;

use super::{AccessRequest, AllowList, CloudProvider, Provider, TargetDefaults};

pub const DEFAULT_PROJECT_PERMISSIONS: &[&str] = &[
    "ObjectStorageFullAccess",
    "SecretManagerFullAccess",
    "KeyManagerFullAccess",
];

pub const DEFAULT_ORGANIZATION_PERMISSIONS: &[&str] = &[
    "ProjectReadOnly",
    "IAMApplicationManager",
    "IAMGroupManager",
    "IAMPolicyManager",
    "OrganizationReadOnly",
];

pub struct ScalewayProvider {
    settings: ScalewaySettings,
}

impl ScalewayProvider {
    pub fn new(settings: ScalewaySettings) -> Self {
        Self { settings }
    }
}

impl CloudProvider for ScalewayProvider {
    fn provider(&self) -> Provider {
        Provider::Scaleway
    }

    fn access_request(&self, repository: &RepositoryDeclaration) -> Option<AccessRequest> {
        let scaleway = repository.access_permissions.scaleway.as_ref()?;
        Some(AccessRequest {
            target: scaleway.project.clone(),
            region: scaleway.region.clone(),
            zone: scaleway.zone.clone(),
            iam_permissions: scaleway.iam_permissions.clone(),
            linked: scaleway.linked_projects.clone(),
            ..Default::default()
        })
    }

    /// Projects are allow-listed by name.
    fn allow_list(&self) -> AllowList {
        self.settings.projects.keys().cloned().collect()
    }

    fn target_defaults(&self) -> TargetDefaults {
        TargetDefaults {
            region: self.settings.default_region.clone(),
            zone: self.settings.default_zone.clone(),
        }
    }

    fn default_permissions(&self) -> &'static [&'static str] {
        DEFAULT_PROJECT_PERMISSIONS
    }

    fn organization_permissions(&self) -> &'static [&'static str] {
        DEFAULT_ORGANIZATION_PERMISSIONS
    }

    fn federates(&self) -> bool {
        false
    }

    fn target_identity(
        &self,
        target: &str,
        region: Option<&str>,
        zone: Option<&str>,
    ) -> Result<TargetIdentity> {
        let project_id = self.settings.projects.get(target).ok_or_else(|| {
            Error::provisioning(
                Provider::Scaleway,
                "project",
                target,
                "project is not configured",
            )
        })?;
        Ok(TargetIdentity {
            provider: Provider::Scaleway,
            id: target.to_string(),
            region: region
                .map(str::to_string)
                .or_else(|| self.settings.default_region.clone()),
            zone: zone
                .map(str::to_string)
                .or_else(|| self.settings.default_zone.clone()),
            access: TargetAccess::Project {
                project_id: project_id.clone(),
                organization_id: self.settings.organization_id.clone(),
            },
        })
    }

    fn grant_name(&self, name: &IdentityName, target: &str) -> String {
        format!("{}-{}", name.full, target)
    }

    fn secret_key(&self) -> &'static str {
        "scaleway"
    }

    fn secret_payload(
        &self,
        _request: &ResolvedRequest,
        target: &TargetIdentity,
        _federation: Option<&FederatedIdentity>,
        identity: &ServiceIdentity,
    ) -> SecretPayload {
        let (project_id, organization_id) = match &target.access {
            TargetAccess::Project {
                project_id,
                organization_id,
            } => (project_id.clone(), organization_id.clone().unwrap_or_default()),
            _ => (target.id.clone(), String::new()),
        };
        let credential = |key: &str| identity.credentials.get(key).cloned().unwrap_or_default();
        SecretPayload::from_pairs([
            ("access_key", credential("access_key")),
            ("secret_key", credential("secret_key")),
            ("region", target.region.clone().unwrap_or_default()),
            ("zone", target.zone.clone().unwrap_or_default()),
            ("organization_id", organization_id),
            ("project_id", project_id),
        ])
    }
}

//! Google Cloud: one workload identity pool per project, one service account
//! per repository, a custom role per (repository, project).

use crate::backend::{FederatedIdentity, ServiceIdentity, TargetAccess, TargetIdentity, TrustBinding};
use crate::config::{GoogleSettings, RepositoryDeclaration};
use crate::error::{Error, Result};
use crate::naming::IdentityName;
use crate::phases::grouping::ResolvedRequest;
use crate::secrets::SecretPayload;

use super::{AccessRequest, AllowList, CloudProvider, Provider, TargetDefaults, TrustCondition};

/// Key of the optional HMAC key secret.
pub const STORAGE_SECRET_KEY: &str = "google-cloud-storage";

pub const DEFAULT_PERMISSIONS: &[&str] = &[
    "cloudkms.cryptoKeyVersions.useToDecrypt",
    "cloudkms.cryptoKeyVersions.useToEncrypt",
    "cloudkms.cryptoKeys.getIamPolicy",
    "cloudkms.cryptoKeys.setIamPolicy",
    "cloudkms.locations.get",
    "cloudkms.locations.list",
    "compute.regions.list",
    "iam.serviceAccountKeys.create",
    "iam.serviceAccountKeys.delete",
    "iam.serviceAccountKeys.disable",
    "iam.serviceAccountKeys.enable",
    "iam.serviceAccountKeys.get",
    "iam.serviceAccountKeys.list",
    "iam.serviceAccounts.create",
    "iam.serviceAccounts.delete",
    "iam.serviceAccounts.disable",
    "iam.serviceAccounts.enable",
    "iam.serviceAccounts.get",
    "iam.serviceAccounts.getIamPolicy",
    "iam.serviceAccounts.list",
    "iam.serviceAccounts.setIamPolicy",
    "iam.serviceAccounts.undelete",
    "iam.serviceAccounts.update",
    "resourcemanager.projects.get",
    "resourcemanager.projects.getIamPolicy",
    "resourcemanager.projects.setIamPolicy",
    "resourcemanager.projects.update",
    "storage.hmacKeys.create",
    "storage.hmacKeys.delete",
    "storage.hmacKeys.get",
    "storage.hmacKeys.list",
    "storage.hmacKeys.update",
    "storage.buckets.create",
    "storage.buckets.createTagBinding",
    "storage.buckets.delete",
    "storage.buckets.deleteTagBinding",
    "storage.buckets.get",
    "storage.buckets.getIamPolicy",
    "storage.buckets.getObjectInsights",
    "storage.buckets.list",
    "storage.buckets.listEffectiveTags",
    "storage.buckets.listTagBindings",
    "storage.buckets.setIamPolicy",
    "storage.buckets.update",
    "storage.multipartUploads.abort",
    "storage.multipartUploads.create",
    "storage.multipartUploads.list",
    "storage.multipartUploads.listParts",
    "storage.objects.create",
    "storage.objects.delete",
    "storage.objects.get",
    "storage.objects.getIamPolicy",
    "storage.objects.list",
    "storage.objects.setIamPolicy",
    "storage.objects.update",
];

pub const DEFAULT_SERVICES: &[&str] = &[
    "iam.googleapis.com",
    "iamcredentials.googleapis.com",
    "cloudresourcemanager.googleapis.com",
    "cloudkms.googleapis.com",
    "storage.googleapis.com",
    "storage-component.googleapis.com",
    "compute.googleapis.com",
];

pub struct GoogleProvider {
    settings: GoogleSettings,
}

impl GoogleProvider {
    pub fn new(settings: GoogleSettings) -> Self {
        Self { settings }
    }
}

impl CloudProvider for GoogleProvider {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    fn access_request(&self, repository: &RepositoryDeclaration) -> Option<AccessRequest> {
        let google = repository.access_permissions.google.as_ref()?;
        Some(AccessRequest {
            target: google.project.clone(),
            region: google.region.clone(),
            zone: None,
            iam_permissions: google.iam_permissions.clone(),
            linked: google.linked_projects.clone(),
            enabled_services: google.enabled_services.clone(),
            hmac_key: google.hmac_key,
        })
    }

    fn allow_list(&self) -> AllowList {
        self.settings.projects.iter().cloned().collect()
    }

    fn target_defaults(&self) -> TargetDefaults {
        TargetDefaults {
            region: self.settings.default_region.clone(),
            zone: None,
        }
    }

    fn default_permissions(&self) -> &'static [&'static str] {
        DEFAULT_PERMISSIONS
    }

    fn default_services(&self) -> &'static [&'static str] {
        DEFAULT_SERVICES
    }

    fn target_identity(
        &self,
        target: &str,
        region: Option<&str>,
        _zone: Option<&str>,
    ) -> Result<TargetIdentity> {
        if !self.settings.projects.iter().any(|p| p == target) {
            return Err(Error::provisioning(
                Provider::Google,
                "project",
                target,
                "project is not configured",
            ));
        }
        Ok(TargetIdentity {
            provider: Provider::Google,
            id: target.to_string(),
            region: region
                .map(str::to_string)
                .or_else(|| self.settings.default_region.clone()),
            zone: None,
            access: TargetAccess::Project {
                project_id: target.to_string(),
                organization_id: None,
            },
        })
    }

    fn trust_binding(
        &self,
        federation: &FederatedIdentity,
        condition: &TrustCondition,
    ) -> Option<TrustBinding> {
        let provider_name = federation
            .provider_name
            .clone()
            .unwrap_or_else(|| federation.id.clone());
        Some(TrustBinding {
            federation_id: federation.id.clone(),
            principal: format!(
                "principalSet://iam.googleapis.com/{}/attribute.repository/{}",
                federation.id,
                condition.subject()
            ),
            audience: format!("https://iam.googleapis.com/{}", provider_name),
            subject: condition.subject(),
            condition: condition.clone(),
        })
    }

    // Custom role ids only allow letters, digits, dots and underscores.
    fn grant_name(&self, name: &IdentityName, _target: &str) -> String {
        format!("ci.{}.{}", name.truncated.replace('-', "_"), name.suffix)
    }

    fn secret_key(&self) -> &'static str {
        "google-cloud"
    }

    fn secret_payload(
        &self,
        _request: &ResolvedRequest,
        target: &TargetIdentity,
        federation: Option<&FederatedIdentity>,
        identity: &ServiceIdentity,
    ) -> SecretPayload {
        let provider_name = federation
            .map(|f| f.provider_name.clone().unwrap_or_else(|| f.id.clone()))
            .unwrap_or_default();
        SecretPayload::from_pairs([
            ("workload_identity_provider", provider_name),
            ("ci_service_account", identity.principal.clone()),
            ("region", target.region.clone().unwrap_or_default()),
        ])
    }

    fn storage_key_enabled(&self, request: &ResolvedRequest) -> bool {
        self.settings.allow_hmac_keys && request.hmac_key
    }
}

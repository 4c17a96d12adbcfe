//! AWS: one GitHub OIDC identity provider per account, one IAM role per
//! repository.

use crate::backend::{FederatedIdentity, ServiceIdentity, TargetAccess, TargetIdentity, TrustBinding};
use crate::config::{AwsSettings, RepositoryDeclaration};
use crate::error::{Error, Result};
use crate::naming::IdentityName;
use crate::phases::grouping::ResolvedRequest;
use crate::secrets::SecretPayload;

use super::{AccessRequest, AllowList, CloudProvider, Provider, TargetDefaults, TrustCondition};

pub const DEFAULT_PERMISSIONS: &[&str] = &["iam:*", "s3:*", "kms:*"];

pub const AUDIENCE: &str = "sts.amazonaws.com";

pub struct AwsProvider {
    settings: AwsSettings,
}

impl AwsProvider {
    pub fn new(settings: AwsSettings) -> Self {
        Self { settings }
    }
}

impl CloudProvider for AwsProvider {
    fn provider(&self) -> Provider {
        Provider::Aws
    }

    fn access_request(&self, repository: &RepositoryDeclaration) -> Option<AccessRequest> {
        let aws = repository.access_permissions.aws.as_ref()?;
        Some(AccessRequest {
            target: aws.account.clone(),
            region: aws.region.clone(),
            iam_permissions: aws.iam_permissions.clone(),
            ..Default::default()
        })
    }

    fn allow_list(&self) -> AllowList {
        self.settings.account.keys().cloned().collect()
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

    fn target_identity(
        &self,
        target: &str,
        region: Option<&str>,
        _zone: Option<&str>,
    ) -> Result<TargetIdentity> {
        let account = self.settings.account.get(target).ok_or_else(|| {
            Error::provisioning(Provider::Aws, "account", target, "account is not configured")
        })?;
        let access = match &account.role_arn {
            Some(role_arn) => TargetAccess::AssumeRole {
                role_arn: role_arn.clone(),
                external_id: account.external_id.clone(),
            },
            None => TargetAccess::Ambient,
        };
        Ok(TargetIdentity {
            provider: Provider::Aws,
            id: target.to_string(),
            region: region
                .map(str::to_string)
                .or_else(|| self.settings.default_region.clone()),
            zone: None,
            access,
        })
    }

    fn trust_binding(
        &self,
        federation: &FederatedIdentity,
        condition: &TrustCondition,
    ) -> Option<TrustBinding> {
        Some(TrustBinding {
            federation_id: federation.id.clone(),
            principal: federation.id.clone(),
            audience: AUDIENCE.to_string(),
            // The trailing wildcard spans refs of one repository only.
            subject: format!("repo:{}:*", condition.subject()),
            condition: condition.clone(),
        })
    }

    fn grant_name(&self, name: &IdentityName, _target: &str) -> String {
        format!("{}-policy", name.full)
    }

    fn secret_key(&self) -> &'static str {
        "aws"
    }

    fn secret_payload(
        &self,
        _request: &ResolvedRequest,
        target: &TargetIdentity,
        _federation: Option<&FederatedIdentity>,
        identity: &ServiceIdentity,
    ) -> SecretPayload {
        SecretPayload::from_pairs([
            ("identity_role_arn", identity.principal.clone()),
            ("region", target.region.clone().unwrap_or_default()),
        ])
    }
}

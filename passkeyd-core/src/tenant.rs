//! Tenant relying-party identity and policy.
//!
//! Tenant configuration is owned by an external collaborator. The core only
//! consumes it through [`TenantConfigProvider`], resolving it on every call.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::model::TenantId;
use crate::store::StoreError;

/// Default ceremony timeout advertised to the client (milliseconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

const ANDROID_ORIGIN_PREFIX: &str = "android:apk-key-hash:";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationRequirement {
    Required,
    #[default]
    Preferred,
    Discouraged,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyance {
    #[default]
    None,
    Indirect,
    Direct,
    Enterprise,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResidentKeyRequirement {
    Discouraged,
    #[default]
    Preferred,
    Required,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticatorAttachment {
    Platform,
    CrossPlatform,
}

/// Relying-party identity and ceremony policy of one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub id: TenantId,
    pub rp_id: String,
    pub rp_name: String,
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub user_verification: UserVerificationRequirement,
    #[serde(default)]
    pub attestation: AttestationConveyance,
    #[serde(default)]
    pub resident_key: ResidentKeyRequirement,
    #[serde(default)]
    pub authenticator_attachment: Option<AuthenticatorAttachment>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Tenant configuration errors
#[derive(Debug, thiserror::Error)]
pub enum TenantConfigError {
    #[error("Tenant {0}: relying party id must not be empty")]
    MissingRpId(TenantId),
    #[error("Tenant {0}: relying party name must not be empty")]
    MissingRpName(TenantId),
    #[error("Tenant {0}: at least one allowed origin is required")]
    NoOrigins(TenantId),
    #[error("Tenant {tenant}: invalid origin {origin}")]
    InvalidOrigin { tenant: TenantId, origin: String },
    #[error("Duplicate tenant id {0}")]
    Duplicate(TenantId),
    #[error("Invalid tenant document: {0}")]
    Parse(#[from] serde_json::Error),
}

impl TenantConfig {
    /// Minimal configuration with default policy.
    pub fn new(
        id: TenantId,
        rp_id: impl Into<String>,
        rp_name: impl Into<String>,
        allowed_origins: Vec<String>,
    ) -> Self {
        Self {
            id,
            rp_id: rp_id.into(),
            rp_name: rp_name.into(),
            allowed_origins,
            user_verification: UserVerificationRequirement::default(),
            attestation: AttestationConveyance::default(),
            resident_key: ResidentKeyRequirement::default(),
            authenticator_attachment: None,
            icon: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn validate(&self) -> Result<(), TenantConfigError> {
        if self.rp_id.trim().is_empty() {
            return Err(TenantConfigError::MissingRpId(self.id));
        }
        if self.rp_name.trim().is_empty() {
            return Err(TenantConfigError::MissingRpName(self.id));
        }
        if self.allowed_origins.is_empty() {
            return Err(TenantConfigError::NoOrigins(self.id));
        }
        for origin in &self.allowed_origins {
            let valid = origin.starts_with(ANDROID_ORIGIN_PREFIX)
                || Url::parse(origin)
                    .map(|url| url.has_host() && url.origin().ascii_serialization() == *origin)
                    .unwrap_or(false);
            if !valid {
                return Err(TenantConfigError::InvalidOrigin {
                    tenant: self.id,
                    origin: origin.clone(),
                });
            }
        }
        Ok(())
    }

    /// Exact membership test against the configured origins.
    pub fn is_allowed_origin(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|allowed| allowed == origin)
    }
}

/// Resolves per-tenant configuration.
#[async_trait]
pub trait TenantConfigProvider: Send + Sync {
    /// Fails with [`StoreError::NotFound`] for unknown tenants.
    async fn get(&self, tenant_id: TenantId) -> Result<TenantConfig, StoreError>;
}

/// Immutable tenant table built once at startup.
#[derive(Debug, Default, Clone)]
pub struct StaticTenantProvider {
    tenants: HashMap<TenantId, TenantConfig>,
}

impl StaticTenantProvider {
    pub fn new(tenants: impl IntoIterator<Item = TenantConfig>) -> Result<Self, TenantConfigError> {
        let mut map = HashMap::new();
        for tenant in tenants {
            tenant.validate()?;
            let id = tenant.id;
            if map.insert(id, tenant).is_some() {
                return Err(TenantConfigError::Duplicate(id));
            }
        }
        Ok(Self { tenants: map })
    }

    /// Parse a JSON array of tenant configurations.
    pub fn from_json(document: &str) -> Result<Self, TenantConfigError> {
        let tenants: Vec<TenantConfig> = serde_json::from_str(document)?;
        Self::new(tenants)
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}

#[async_trait]
impl TenantConfigProvider for StaticTenantProvider {
    async fn get(&self, tenant_id: TenantId) -> Result<TenantConfig, StoreError> {
        self.tenants
            .get(&tenant_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("tenant {tenant_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn tenant() -> TenantConfig {
        TenantConfig::new(
            Uuid::new_v4(),
            "example.com",
            "Example",
            vec!["https://example.com".into()],
        )
    }

    #[test]
    fn test_from_json_applies_policy_defaults() {
        let id = Uuid::new_v4();
        let doc = format!(
            r#"[{{"id":"{id}","rp_id":"example.com","rp_name":"Example","allowed_origins":["https://example.com"]}}]"#
        );
        let provider = StaticTenantProvider::from_json(&doc).unwrap();
        assert_eq!(provider.len(), 1);
        let config = provider.tenants.get(&id).unwrap();
        assert_eq!(config.user_verification, UserVerificationRequirement::Preferred);
        assert_eq!(config.attestation, AttestationConveyance::None);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn test_validate_rejects_origin_with_path() {
        let mut config = tenant();
        config.allowed_origins = vec!["https://example.com/login".into()];
        assert!(matches!(
            config.validate(),
            Err(TenantConfigError::InvalidOrigin { .. })
        ));
    }

    #[test]
    fn test_validate_requires_serialized_origin_form() {
        for origin in [
            "https://example.com/",
            "https://example.com?next=1",
            "https://EXAMPLE.com",
            "https://example.com:443",
        ] {
            let mut config = tenant();
            config.allowed_origins = vec![origin.into()];
            assert!(
                matches!(config.validate(), Err(TenantConfigError::InvalidOrigin { .. })),
                "{origin} should be rejected"
            );
        }

        let mut config = tenant();
        config.allowed_origins = vec!["http://localhost:8080".into()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_accepts_android_origin() {
        let mut config = tenant();
        config
            .allowed_origins
            .push("android:apk-key-hash:abc123".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_tenant_rejected() {
        let config = tenant();
        let result = StaticTenantProvider::new([config.clone(), config]);
        assert!(matches!(result, Err(TenantConfigError::Duplicate(_))));
    }

    #[test]
    fn test_origin_membership_is_exact() {
        let config = tenant();
        assert!(config.is_allowed_origin("https://example.com"));
        assert!(!config.is_allowed_origin("https://example.com/"));
        assert!(!config.is_allowed_origin("https://evil.example.com"));
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_not_found() {
        let provider = StaticTenantProvider::new([tenant()]).unwrap();
        let result = provider.get(Uuid::new_v4()).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}

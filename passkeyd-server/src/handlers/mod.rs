//! HTTP request handlers
//!
//! Each ceremony endpoint lives under a tenant path prefix.

pub mod credentials;
pub mod health;
pub mod login;
pub mod registration;

use chrono::{DateTime, Utc};
use passkeyd_core::wire::encode_base64url;
use passkeyd_core::Credential;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

// Re-export handlers for convenience
pub use credentials::{
    delete_credential, list_credentials, rename_credential, RenameCredentialRequest,
};
pub use health::{health, ready, HealthResponse, ReadyResponse};
pub use login::{login_finalize, login_initialize, LoginInitRequest};
pub use registration::{registration_finalize, registration_initialize, RegistrationInitRequest};

/// An enrolled credential as returned to API clients
#[derive(Debug, Serialize, ToSchema)]
pub struct CredentialResponse {
    /// Credential id, base64url
    #[schema(example = "q8yKf1yNSkeG3rQkx0tU4A")]
    pub id: String,
    pub user_id: String,
    pub name: Option<String>,
    /// COSE_Key, base64url
    pub public_key: String,
    /// COSE algorithm name
    #[schema(example = "ES256")]
    pub algorithm: &'static str,
    pub sign_count: u32,
    /// "none", "self" or "basic"
    #[schema(example = "none")]
    pub attestation_type: &'static str,
    pub aaguid: Uuid,
    pub transports: Vec<String>,
    pub backup_eligible: bool,
    pub backup_state: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<Credential> for CredentialResponse {
    fn from(credential: Credential) -> Self {
        Self {
            id: credential.id.to_base64url(),
            user_id: credential.user_id,
            name: credential.name,
            public_key: encode_base64url(&credential.public_key),
            algorithm: credential.algorithm.name(),
            sign_count: credential.sign_counter,
            attestation_type: credential.attestation_type.as_str(),
            aaguid: credential.aaguid,
            transports: credential
                .transports
                .iter()
                .map(|t| t.as_str().to_string())
                .collect(),
            backup_eligible: credential.backup_eligible,
            backup_state: credential.backup_state,
            created_at: credential.created_at,
            last_used_at: credential.last_used_at,
        }
    }
}

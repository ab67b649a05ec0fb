//! Domain records shared by the stores and the ceremony controllers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::crypto::CoseAlgorithm;
use crate::wire::{decode_base64url, encode_base64url};

/// Tenants are addressed by UUID on every operation.
pub type TenantId = Uuid;

/// A tenant-scoped end user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebauthnUser {
    pub tenant_id: TenantId,
    pub user_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub icon: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WebauthnUser {
    /// User handle bound into credentials: the UTF-8 bytes of the user id.
    pub fn user_handle(&self) -> Vec<u8> {
        self.user_id.as_bytes().to_vec()
    }

    /// Display name, falling back to the username.
    pub fn display_name_or_username(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// Opaque credential handle chosen by the authenticator.
///
/// Rendered as unpadded base64url in logs and JSON.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CredentialId(Vec<u8>);

impl CredentialId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn from_base64url(encoded: &str) -> Option<Self> {
        decode_base64url(encoded).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base64url(&self) -> String {
        encode_base64url(&self.0)
    }
}

impl From<Vec<u8>> for CredentialId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for CredentialId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64url())
    }
}

impl fmt::Debug for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialId({})", self.to_base64url())
    }
}

impl Serialize for CredentialId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64url())
    }
}

impl<'de> Deserialize<'de> for CredentialId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        decode_base64url(&encoded)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

/// Authenticator transport hints (WebAuthn `AuthenticatorTransport`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticatorTransport {
    Usb,
    Nfc,
    Ble,
    SmartCard,
    Hybrid,
    Internal,
}

impl AuthenticatorTransport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usb => "usb",
            Self::Nfc => "nfc",
            Self::Ble => "ble",
            Self::SmartCard => "smart-card",
            Self::Hybrid => "hybrid",
            Self::Internal => "internal",
        }
    }
}

impl FromStr for AuthenticatorTransport {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "usb" => Ok(Self::Usb),
            "nfc" => Ok(Self::Nfc),
            "ble" => Ok(Self::Ble),
            "smart-card" => Ok(Self::SmartCard),
            "hybrid" | "cable" => Ok(Self::Hybrid),
            "internal" => Ok(Self::Internal),
            other => Err(format!("unknown transport: {other}")),
        }
    }
}

/// Provenance established for a credential at registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationType {
    /// No attestation statement was conveyed
    #[default]
    None,
    /// Statement signed by the credential key itself
    #[serde(rename = "self")]
    SelfAttestation,
    /// Statement signed by an attestation certificate
    Basic,
}

impl AttestationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::SelfAttestation => "self",
            Self::Basic => "basic",
        }
    }
}

impl FromStr for AttestationType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "none" => Ok(Self::None),
            "self" => Ok(Self::SelfAttestation),
            "basic" => Ok(Self::Basic),
            other => Err(format!("unknown attestation type: {other}")),
        }
    }
}

/// An enrolled passkey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    pub tenant_id: TenantId,
    pub user_id: String,
    /// COSE_Key bytes exactly as emitted by the authenticator
    pub public_key: Vec<u8>,
    pub algorithm: CoseAlgorithm,
    pub sign_counter: u32,
    pub transports: Vec<AuthenticatorTransport>,
    pub backup_eligible: bool,
    pub backup_state: bool,
    pub attestation_type: AttestationType,
    pub aaguid: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub name: Option<String>,
}

/// Fields written by a successful authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterUpdate {
    pub sign_counter: u32,
    pub backup_state: bool,
    pub used_at: DateTime<Utc>,
}

/// Which ceremony a challenge session was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CeremonyKind {
    Registration,
    Authentication,
}

impl CeremonyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Authentication => "authentication",
        }
    }
}

/// In-flight ceremony state, consumed exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeSession {
    pub id: Uuid,
    pub tenant_id: TenantId,
    /// Absent for discoverable ("passwordless") login
    pub user_id: Option<String>,
    pub challenge: Vec<u8>,
    pub kind: CeremonyKind,
    /// Excluded ids for registration, allowed ids for authentication
    pub credential_ids: Vec<CredentialId>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ChallengeSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

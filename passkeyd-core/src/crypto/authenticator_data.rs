//! Authenticator data decoding (WebAuthn §6.1).

use std::io::Cursor;

use ciborium::value::Value;
use uuid::Uuid;

use super::cose::CoseKey;
use super::CryptoError;

const RP_ID_HASH_LEN: usize = 32;
const HEADER_LEN: usize = RP_ID_HASH_LEN + 1 + 4;
const AAGUID_LEN: usize = 16;

/// Longest credential id an authenticator may emit
pub const MAX_CREDENTIAL_ID_LEN: usize = 1023;

/// Authenticator data flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatorFlags(u8);

impl AuthenticatorFlags {
    pub const USER_PRESENT: u8 = 0x01;
    pub const USER_VERIFIED: u8 = 0x04;
    pub const BACKUP_ELIGIBLE: u8 = 0x08;
    pub const BACKUP_STATE: u8 = 0x10;
    pub const ATTESTED_CREDENTIAL_DATA: u8 = 0x40;
    pub const EXTENSION_DATA: u8 = 0x80;

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    fn has(&self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    pub fn user_present(&self) -> bool {
        self.has(Self::USER_PRESENT)
    }

    pub fn user_verified(&self) -> bool {
        self.has(Self::USER_VERIFIED)
    }

    pub fn backup_eligible(&self) -> bool {
        self.has(Self::BACKUP_ELIGIBLE)
    }

    pub fn backup_state(&self) -> bool {
        self.has(Self::BACKUP_STATE)
    }

    pub fn attested_credential_data(&self) -> bool {
        self.has(Self::ATTESTED_CREDENTIAL_DATA)
    }

    pub fn extension_data(&self) -> bool {
        self.has(Self::EXTENSION_DATA)
    }
}

/// Credential material present at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    pub aaguid: Uuid,
    pub credential_id: Vec<u8>,
    pub public_key: CoseKey,
    /// COSE_Key bytes as they appeared on the wire
    pub public_key_bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: AuthenticatorFlags,
    pub sign_count: u32,
    pub attested_credential: Option<AttestedCredentialData>,
    pub extensions: Option<Value>,
}

impl AuthenticatorData {
    pub fn parse(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < HEADER_LEN {
            return Err(malformed(format!(
                "expected at least {HEADER_LEN} bytes, got {}",
                bytes.len()
            )));
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&bytes[..RP_ID_HASH_LEN]);
        let flags = AuthenticatorFlags::from_bits(bytes[RP_ID_HASH_LEN]);
        let sign_count = u32::from_be_bytes([
            bytes[RP_ID_HASH_LEN + 1],
            bytes[RP_ID_HASH_LEN + 2],
            bytes[RP_ID_HASH_LEN + 3],
            bytes[RP_ID_HASH_LEN + 4],
        ]);

        if flags.backup_state() && !flags.backup_eligible() {
            return Err(malformed("backup state set without backup eligibility"));
        }

        let mut rest = &bytes[HEADER_LEN..];

        let attested_credential = if flags.attested_credential_data() {
            let (data, consumed) = parse_attested_credential(rest)?;
            rest = &rest[consumed..];
            Some(data)
        } else {
            None
        };

        let extensions = if flags.extension_data() {
            let mut cursor = Cursor::new(rest);
            let value: Value = ciborium::de::from_reader(&mut cursor)
                .map_err(|e| malformed(format!("extensions: {e}")))?;
            if !value.is_map() {
                return Err(malformed("extensions must be a CBOR map"));
            }
            rest = &rest[cursor.position() as usize..];
            Some(value)
        } else {
            None
        };

        if !rest.is_empty() {
            return Err(malformed(format!("{} trailing bytes", rest.len())));
        }

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested_credential,
            extensions,
        })
    }
}

fn parse_attested_credential(bytes: &[u8]) -> Result<(AttestedCredentialData, usize), CryptoError> {
    if bytes.len() < AAGUID_LEN + 2 {
        return Err(malformed("attested credential data truncated"));
    }
    let mut aaguid = [0u8; AAGUID_LEN];
    aaguid.copy_from_slice(&bytes[..AAGUID_LEN]);
    let id_len = u16::from_be_bytes([bytes[AAGUID_LEN], bytes[AAGUID_LEN + 1]]) as usize;
    if id_len > MAX_CREDENTIAL_ID_LEN {
        return Err(malformed(format!("credential id length {id_len} exceeds limit")));
    }

    let id_start = AAGUID_LEN + 2;
    let key_start = id_start + id_len;
    if bytes.len() < key_start {
        return Err(malformed("credential id truncated"));
    }
    let credential_id = bytes[id_start..key_start].to_vec();

    let key_bytes = &bytes[key_start..];
    let mut cursor = Cursor::new(key_bytes);
    let key_value: Value = ciborium::de::from_reader(&mut cursor)
        .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
    let key_len = cursor.position() as usize;
    let public_key = CoseKey::from_value(&key_value)?;

    Ok((
        AttestedCredentialData {
            aaguid: Uuid::from_bytes(aaguid),
            credential_id,
            public_key,
            public_key_bytes: key_bytes[..key_len].to_vec(),
        },
        key_start + key_len,
    ))
}

fn malformed(reason: impl Into<String>) -> CryptoError {
    CryptoError::MalformedAuthenticatorData(reason.into())
}

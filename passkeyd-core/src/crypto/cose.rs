//! COSE_Key decoding (RFC 9052/9053) and signature verification.

use std::io::Cursor;

use ciborium::value::{Integer, Value};
use serde::{Deserialize, Serialize};

use super::CryptoError;

// COSE_Key labels
const LABEL_KTY: i64 = 1;
const LABEL_ALG: i64 = 3;
const LABEL_CRV: i64 = -1;
const LABEL_X: i64 = -2;
const LABEL_Y: i64 = -3;
const LABEL_RSA_N: i64 = -1;
const LABEL_RSA_E: i64 = -2;

// Key types
const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;

// Curves
const CRV_P256: i64 = 1;
const CRV_ED25519: i64 = 6;

/// Public-key algorithms accepted for credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum CoseAlgorithm {
    /// ECDSA P-256 with SHA-256
    Es256,
    /// Ed25519
    EdDsa,
    /// RSASSA-PKCS1-v1_5 with SHA-256
    Rs256,
}

impl CoseAlgorithm {
    /// Preference order advertised in `pubKeyCredParams`
    pub const SUPPORTED: [CoseAlgorithm; 3] = [Self::Es256, Self::EdDsa, Self::Rs256];

    pub fn id(&self) -> i64 {
        match self {
            Self::Es256 => -7,
            Self::EdDsa => -8,
            Self::Rs256 => -257,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            -7 => Some(Self::Es256),
            -8 => Some(Self::EdDsa),
            -257 => Some(Self::Rs256),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Es256 => "ES256",
            Self::EdDsa => "EdDSA",
            Self::Rs256 => "RS256",
        }
    }
}

impl From<CoseAlgorithm> for i64 {
    fn from(alg: CoseAlgorithm) -> Self {
        alg.id()
    }
}

impl TryFrom<i64> for CoseAlgorithm {
    type Error = String;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        Self::from_id(id).ok_or_else(|| format!("unsupported COSE algorithm {id}"))
    }
}

/// Key parameters for the supported key types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    /// Uncompressed P-256 point
    Ec2 { x: [u8; 32], y: [u8; 32] },
    /// Ed25519 public key
    Okp { x: [u8; 32] },
    /// RSA modulus and exponent, big-endian
    Rsa { n: Vec<u8>, e: Vec<u8> },
}

/// A decoded credential public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoseKey {
    pub algorithm: CoseAlgorithm,
    pub material: KeyMaterial,
}

impl CoseKey {
    /// Decode a complete COSE_Key; trailing bytes are rejected.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, CryptoError> {
        let mut cursor = Cursor::new(bytes);
        let value: Value = ciborium::de::from_reader(&mut cursor)
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        if cursor.position() as usize != bytes.len() {
            return Err(CryptoError::MalformedKey("trailing bytes after key".into()));
        }
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, CryptoError> {
        let entries = value
            .as_map()
            .ok_or_else(|| CryptoError::MalformedKey("key is not a CBOR map".into()))?;

        let kty = int_param(entries, LABEL_KTY)?
            .ok_or_else(|| CryptoError::MalformedKey("missing kty".into()))?;
        let alg_id = int_param(entries, LABEL_ALG)?
            .ok_or_else(|| CryptoError::MalformedKey("missing alg".into()))?;
        let algorithm =
            CoseAlgorithm::from_id(alg_id).ok_or(CryptoError::UnsupportedAlgorithm(alg_id))?;

        let material = match (kty, algorithm) {
            (KTY_EC2, CoseAlgorithm::Es256) => {
                let crv = int_param(entries, LABEL_CRV)?;
                if crv != Some(CRV_P256) {
                    return Err(CryptoError::MalformedKey("ES256 requires curve P-256".into()));
                }
                KeyMaterial::Ec2 {
                    x: fixed_bytes(entries, LABEL_X, "x")?,
                    y: fixed_bytes(entries, LABEL_Y, "y")?,
                }
            }
            (KTY_OKP, CoseAlgorithm::EdDsa) => {
                let crv = int_param(entries, LABEL_CRV)?;
                if crv != Some(CRV_ED25519) {
                    return Err(CryptoError::MalformedKey("EdDSA requires curve Ed25519".into()));
                }
                KeyMaterial::Okp {
                    x: fixed_bytes(entries, LABEL_X, "x")?,
                }
            }
            (KTY_RSA, CoseAlgorithm::Rs256) => KeyMaterial::Rsa {
                n: bytes_param(entries, LABEL_RSA_N, "n")?.to_vec(),
                e: bytes_param(entries, LABEL_RSA_E, "e")?.to_vec(),
            },
            _ => {
                return Err(CryptoError::MalformedKey(format!(
                    "key type {kty} does not match algorithm {}",
                    algorithm.name()
                )))
            }
        };

        Ok(Self {
            algorithm,
            material,
        })
    }

    /// Canonical CBOR encoding of this key.
    pub fn to_cbor(&self) -> Vec<u8> {
        let int = |v: i64| Value::Integer(Integer::from(v));
        let mut entries = Vec::new();
        match &self.material {
            KeyMaterial::Ec2 { x, y } => {
                entries.push((int(LABEL_KTY), int(KTY_EC2)));
                entries.push((int(LABEL_ALG), int(self.algorithm.id())));
                entries.push((int(LABEL_CRV), int(CRV_P256)));
                entries.push((int(LABEL_X), Value::Bytes(x.to_vec())));
                entries.push((int(LABEL_Y), Value::Bytes(y.to_vec())));
            }
            KeyMaterial::Okp { x } => {
                entries.push((int(LABEL_KTY), int(KTY_OKP)));
                entries.push((int(LABEL_ALG), int(self.algorithm.id())));
                entries.push((int(LABEL_CRV), int(CRV_ED25519)));
                entries.push((int(LABEL_X), Value::Bytes(x.to_vec())));
            }
            KeyMaterial::Rsa { n, e } => {
                entries.push((int(LABEL_KTY), int(KTY_RSA)));
                entries.push((int(LABEL_ALG), int(self.algorithm.id())));
                entries.push((int(LABEL_RSA_N), Value::Bytes(n.clone())));
                entries.push((int(LABEL_RSA_E), Value::Bytes(e.clone())));
            }
        }
        let mut out = Vec::new();
        // Writing into a Vec cannot fail
        let _ = ciborium::ser::into_writer(&Value::Map(entries), &mut out);
        out
    }

    /// Verify `signature` over `message` with this key.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        match &self.material {
            KeyMaterial::Ec2 { x, y } => {
                let mut sec1 = [0u8; 65];
                sec1[0] = 0x04;
                sec1[1..33].copy_from_slice(x);
                sec1[33..].copy_from_slice(y);
                let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                    .map_err(|_| CryptoError::MalformedKey("point is not on P-256".into()))?;
                verify_es256(&key, message, signature)
            }
            KeyMaterial::Okp { x } => verify_ed25519(x, message, signature),
            KeyMaterial::Rsa { n, e } => {
                let key = rsa::RsaPublicKey::new(
                    rsa::BigUint::from_bytes_be(n),
                    rsa::BigUint::from_bytes_be(e),
                )
                .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
                verify_rs256(key, message, signature)
            }
        }
    }

    /// SEC1 uncompressed point, as used by FIDO U2F verification data.
    pub(crate) fn uncompressed_point(&self) -> Option<[u8; 65]> {
        match &self.material {
            KeyMaterial::Ec2 { x, y } => {
                let mut point = [0u8; 65];
                point[0] = 0x04;
                point[1..33].copy_from_slice(x);
                point[33..].copy_from_slice(y);
                Some(point)
            }
            _ => None,
        }
    }
}

/// ES256: DER-encoded ECDSA signature, SHA-256 applied by the verifier.
pub(crate) fn verify_es256(
    key: &p256::ecdsa::VerifyingKey,
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    use p256::ecdsa::signature::Verifier;

    let signature =
        p256::ecdsa::Signature::from_der(signature).map_err(|_| CryptoError::MalformedSignature)?;
    key.verify(message, &signature)
        .map_err(|_| CryptoError::InvalidSignature)
}

pub(crate) fn verify_rs256(
    key: rsa::RsaPublicKey,
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    use rsa::signature::Verifier;

    let verifying_key = rsa::pkcs1v15::VerifyingKey::<sha2::Sha256>::new(key);
    let signature = rsa::pkcs1v15::Signature::try_from(signature)
        .map_err(|_| CryptoError::MalformedSignature)?;
    verifying_key
        .verify(message, &signature)
        .map_err(|_| CryptoError::InvalidSignature)
}

fn verify_ed25519(public_key: &[u8; 32], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let key = ed25519_dalek::VerifyingKey::from_bytes(public_key)
        .map_err(|_| CryptoError::MalformedKey("invalid Ed25519 point".into()))?;
    let signature =
        ed25519_dalek::Signature::from_slice(signature).map_err(|_| CryptoError::MalformedSignature)?;
    key.verify_strict(message, &signature)
        .map_err(|_| CryptoError::InvalidSignature)
}

fn param(entries: &[(Value, Value)], label: i64) -> Option<&Value> {
    entries
        .iter()
        .find(|(key, _)| {
            key.as_integer()
                .and_then(|i| i64::try_from(i).ok())
                .map_or(false, |k| k == label)
        })
        .map(|(_, value)| value)
}

fn int_param(entries: &[(Value, Value)], label: i64) -> Result<Option<i64>, CryptoError> {
    match param(entries, label) {
        None => Ok(None),
        Some(value) => value
            .as_integer()
            .and_then(|i| i64::try_from(i).ok())
            .map(Some)
            .ok_or_else(|| CryptoError::MalformedKey(format!("label {label} is not an integer"))),
    }
}

fn bytes_param<'a>(
    entries: &'a [(Value, Value)],
    label: i64,
    name: &str,
) -> Result<&'a [u8], CryptoError> {
    param(entries, label)
        .and_then(Value::as_bytes)
        .map(Vec::as_slice)
        .ok_or_else(|| CryptoError::MalformedKey(format!("missing {name}")))
}

fn fixed_bytes(entries: &[(Value, Value)], label: i64, name: &str) -> Result<[u8; 32], CryptoError> {
    bytes_param(entries, label, name)?
        .try_into()
        .map_err(|_| CryptoError::MalformedKey(format!("{name} must be 32 bytes")))
}

//! Stateless WebAuthn verification primitives.
//!
//! - `authenticator_data`: binary authenticator data decoding
//! - `cose`: COSE_Key decoding and ES256 / RS256 / EdDSA signature checks
//! - `attestation`: attestation object parsing for `none`, `packed` and `fido-u2f`
//!
//! Nothing here touches storage or tenant state. Every failure is an error
//! value; callers report them as verification failures.

mod attestation;
mod authenticator_data;
mod cose;

pub use attestation::AttestationObject;
pub use authenticator_data::{AttestedCredentialData, AuthenticatorData, AuthenticatorFlags};
pub use cose::{CoseAlgorithm, CoseKey, KeyMaterial};

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("Malformed authenticator data: {0}")]
    MalformedAuthenticatorData(String),

    #[error("Malformed COSE key: {0}")]
    MalformedKey(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(i64),

    #[error("Malformed attestation object: {0}")]
    MalformedAttestation(String),

    #[error("Unsupported attestation format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid attestation certificate: {0}")]
    InvalidCertificate(String),

    #[error("Malformed signature")]
    MalformedSignature,

    #[error("Signature verification failed")]
    InvalidSignature,
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Constant-time equality; slices of different length compare unequal.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

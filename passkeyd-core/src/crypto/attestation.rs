//! Attestation object parsing and statement verification.
//!
//! Supported formats are `none`, `packed` (self and basic) and `fido-u2f`.
//! Certificates are checked structurally; no chain is built to a vendor root.

use ciborium::value::Value;
use uuid::Uuid;
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey;

use super::authenticator_data::{AttestedCredentialData, AuthenticatorData};
use super::cose::{verify_es256, verify_rs256, CoseAlgorithm};
use super::CryptoError;
use crate::model::AttestationType;

const FMT_NONE: &str = "none";
const FMT_PACKED: &str = "packed";
const FMT_FIDO_U2F: &str = "fido-u2f";

/// id-fido-gen-ce-aaguid
const AAGUID_EXTENSION_OID: &str = "1.3.6.1.4.1.45724.1.1.4";

/// Decoded `attestationObject`.
#[derive(Debug, Clone)]
pub struct AttestationObject {
    pub fmt: String,
    pub att_stmt: Vec<(Value, Value)>,
    pub auth_data: AuthenticatorData,
    /// Raw authenticator data; attestation signatures cover these bytes
    pub auth_data_bytes: Vec<u8>,
}

impl AttestationObject {
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, CryptoError> {
        let value: Value = ciborium::de::from_reader(bytes)
            .map_err(|e| malformed(format!("not CBOR: {e}")))?;
        let entries = value
            .into_map()
            .map_err(|_| malformed("attestation object is not a map"))?;

        let mut fmt = None;
        let mut att_stmt = None;
        let mut auth_data_bytes = None;
        for (key, value) in entries {
            match key.as_text() {
                Some("fmt") => fmt = value.into_text().ok(),
                Some("attStmt") => att_stmt = value.into_map().ok(),
                Some("authData") => auth_data_bytes = value.into_bytes().ok(),
                _ => {}
            }
        }

        let fmt = fmt.ok_or_else(|| malformed("missing fmt"))?;
        let att_stmt = att_stmt.ok_or_else(|| malformed("missing attStmt"))?;
        let auth_data_bytes = auth_data_bytes.ok_or_else(|| malformed("missing authData"))?;
        let auth_data = AuthenticatorData::parse(&auth_data_bytes)?;

        Ok(Self {
            fmt,
            att_stmt,
            auth_data,
            auth_data_bytes,
        })
    }

    pub fn attested_credential(&self) -> Result<&AttestedCredentialData, CryptoError> {
        self.auth_data.attested_credential.as_ref().ok_or_else(|| {
            CryptoError::MalformedAuthenticatorData("attested credential data missing".into())
        })
    }

    /// Validate the attestation statement against `clientDataHash`.
    pub fn verify(&self, client_data_hash: &[u8; 32]) -> Result<AttestationType, CryptoError> {
        let credential = self.attested_credential()?;
        match self.fmt.as_str() {
            FMT_NONE => {
                if !self.att_stmt.is_empty() {
                    return Err(malformed("none attestation carries a statement"));
                }
                Ok(AttestationType::None)
            }
            FMT_PACKED => self.verify_packed(credential, client_data_hash),
            FMT_FIDO_U2F => self.verify_fido_u2f(credential, client_data_hash),
            other => Err(CryptoError::UnsupportedFormat(other.to_string())),
        }
    }

    fn verify_packed(
        &self,
        credential: &AttestedCredentialData,
        client_data_hash: &[u8; 32],
    ) -> Result<AttestationType, CryptoError> {
        let alg_id = self
            .stmt_field("alg")
            .and_then(Value::as_integer)
            .and_then(|i| i64::try_from(i).ok())
            .ok_or_else(|| malformed("packed: missing alg"))?;
        let alg = CoseAlgorithm::from_id(alg_id).ok_or(CryptoError::UnsupportedAlgorithm(alg_id))?;
        let sig = self.stmt_bytes("sig")?;

        let mut signed = self.auth_data_bytes.clone();
        signed.extend_from_slice(client_data_hash);

        match self.certificates()? {
            None => {
                if alg != credential.public_key.algorithm {
                    return Err(malformed(format!(
                        "packed: alg {} does not match credential key {}",
                        alg.name(),
                        credential.public_key.algorithm.name()
                    )));
                }
                credential.public_key.verify(&signed, sig)?;
                Ok(AttestationType::SelfAttestation)
            }
            Some(chain) => {
                let leaf = chain
                    .first()
                    .ok_or_else(|| malformed("packed: empty x5c"))?;
                let (_, cert) = X509Certificate::from_der(leaf)
                    .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;
                check_packed_certificate(&cert, credential.aaguid)?;
                verify_with_certificate(&cert, alg, &signed, sig)?;
                Ok(AttestationType::Basic)
            }
        }
    }

    fn verify_fido_u2f(
        &self,
        credential: &AttestedCredentialData,
        client_data_hash: &[u8; 32],
    ) -> Result<AttestationType, CryptoError> {
        let chain = self
            .certificates()?
            .ok_or_else(|| malformed("fido-u2f: missing x5c"))?;
        if chain.len() != 1 {
            return Err(malformed("fido-u2f: exactly one certificate expected"));
        }
        let sig = self.stmt_bytes("sig")?;

        let point = credential
            .public_key
            .uncompressed_point()
            .ok_or_else(|| malformed("fido-u2f: credential key must be P-256"))?;

        let mut signed = Vec::with_capacity(1 + 32 + 32 + credential.credential_id.len() + 65);
        signed.push(0x00);
        signed.extend_from_slice(&self.auth_data.rp_id_hash);
        signed.extend_from_slice(client_data_hash);
        signed.extend_from_slice(&credential.credential_id);
        signed.extend_from_slice(&point);

        let (_, cert) = X509Certificate::from_der(&chain[0])
            .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;
        verify_with_certificate(&cert, CoseAlgorithm::Es256, &signed, sig)?;
        Ok(AttestationType::Basic)
    }

    fn stmt_field(&self, name: &str) -> Option<&Value> {
        self.att_stmt
            .iter()
            .find(|(key, _)| key.as_text() == Some(name))
            .map(|(_, value)| value)
    }

    fn stmt_bytes(&self, name: &str) -> Result<&[u8], CryptoError> {
        self.stmt_field(name)
            .and_then(Value::as_bytes)
            .map(Vec::as_slice)
            .ok_or_else(|| malformed(format!("{}: missing {name}", self.fmt)))
    }

    /// DER certificates from `x5c`, leaf first.
    fn certificates(&self) -> Result<Option<Vec<Vec<u8>>>, CryptoError> {
        let Some(x5c) = self.stmt_field("x5c") else {
            return Ok(None);
        };
        let array = x5c
            .as_array()
            .ok_or_else(|| malformed("x5c is not an array"))?;
        array
            .iter()
            .map(|cert| {
                cert.as_bytes()
                    .cloned()
                    .ok_or_else(|| malformed("x5c entry is not a byte string"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}

fn check_packed_certificate(cert: &X509Certificate<'_>, aaguid: Uuid) -> Result<(), CryptoError> {
    if cert.version() != X509Version::V3 {
        return Err(CryptoError::InvalidCertificate("certificate is not X.509 v3".into()));
    }

    let basic_constraints = cert
        .basic_constraints()
        .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;
    if basic_constraints.map_or(false, |ext| ext.value.ca) {
        return Err(CryptoError::InvalidCertificate(
            "attestation certificate must not be a CA".into(),
        ));
    }

    let aaguid_ext = cert
        .extensions()
        .iter()
        .find(|ext| ext.oid.to_id_string() == AAGUID_EXTENSION_OID);
    if let Some(ext) = aaguid_ext {
        if ext.critical {
            return Err(CryptoError::InvalidCertificate(
                "aaguid extension must not be critical".into(),
            ));
        }
        // The extension wraps the AAGUID in an OCTET STRING
        let value = ext.value;
        if value.len() != 18 || value[0] != 0x04 || value[1] != 0x10 {
            return Err(CryptoError::InvalidCertificate("malformed aaguid extension".into()));
        }
        if value[2..] != aaguid.as_bytes()[..] {
            return Err(CryptoError::InvalidCertificate(
                "certificate aaguid does not match authenticator data".into(),
            ));
        }
    }
    Ok(())
}

fn verify_with_certificate(
    cert: &X509Certificate<'_>,
    alg: CoseAlgorithm,
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let public_key = cert
        .public_key()
        .parsed()
        .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;

    match (alg, public_key) {
        (CoseAlgorithm::Es256, PublicKey::EC(point)) => {
            let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(point.data()).map_err(|_| {
                CryptoError::InvalidCertificate("certificate key is not P-256".into())
            })?;
            verify_es256(&key, message, signature)
        }
        (CoseAlgorithm::Rs256, PublicKey::RSA(rsa_key)) => {
            let key = rsa::RsaPublicKey::new(
                rsa::BigUint::from_bytes_be(rsa_key.modulus),
                rsa::BigUint::from_bytes_be(rsa_key.exponent),
            )
            .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;
            verify_rs256(key, message, signature)
        }
        (alg, _) => Err(CryptoError::InvalidCertificate(format!(
            "certificate key does not support {}",
            alg.name()
        ))),
    }
}

fn malformed(reason: impl Into<String>) -> CryptoError {
    CryptoError::MalformedAttestation(reason.into())
}

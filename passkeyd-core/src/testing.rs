//! Software authenticator producing genuine WebAuthn responses.
//!
//! Available in unit tests and behind the `testing` feature for downstream
//! integration tests. Never use it to hold real credentials.

use ciborium::value::{Integer, Value};
use p256::ecdsa::signature::Signer as _;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::crypto::{sha256, AuthenticatorFlags, CoseAlgorithm, CoseKey, KeyMaterial};
use crate::wire::{
    encode_base64url, AuthenticationResponse, AuthenticatorAssertionResponse,
    AuthenticatorAttestationResponse, Base64UrlBytes, CollectedClientData,
    PublicKeyCredentialCreationOptions, PublicKeyCredentialRequestOptions, RegistrationResponse,
    CLIENT_DATA_CREATE, CLIENT_DATA_GET,
};

enum SoftKey {
    Es256(p256::ecdsa::SigningKey),
    Ed25519(ed25519_dalek::SigningKey),
}

impl SoftKey {
    fn cose_key(&self) -> CoseKey {
        match self {
            Self::Es256(key) => {
                let point = key.verifying_key().to_encoded_point(false);
                let bytes = point.as_bytes();
                let mut x = [0u8; 32];
                let mut y = [0u8; 32];
                x.copy_from_slice(&bytes[1..33]);
                y.copy_from_slice(&bytes[33..65]);
                CoseKey {
                    algorithm: CoseAlgorithm::Es256,
                    material: KeyMaterial::Ec2 { x, y },
                }
            }
            Self::Ed25519(key) => CoseKey {
                algorithm: CoseAlgorithm::EdDsa,
                material: KeyMaterial::Okp {
                    x: key.verifying_key().to_bytes(),
                },
            },
        }
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            Self::Es256(key) => {
                let signature: p256::ecdsa::Signature = key.sign(message);
                signature.to_der().as_bytes().to_vec()
            }
            Self::Ed25519(key) => key.sign(message).to_bytes().to_vec(),
        }
    }
}

/// Attestation statement the authenticator emits at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftAttestation {
    None,
    /// `packed` self attestation signed by the credential key
    PackedSelf,
}

pub struct SoftAuthenticator {
    key: SoftKey,
    credential_id: Vec<u8>,
    aaguid: [u8; 16],
    counter: u32,
    counter_step: u32,
    user_verified: bool,
    backup_eligible: bool,
    backup_state: bool,
    attestation: SoftAttestation,
    origin: Option<String>,
    rp_id: Option<String>,
    send_user_handle: bool,
    user_handle: Option<Vec<u8>>,
}

impl SoftAuthenticator {
    fn with_key(key: SoftKey) -> Self {
        let mut credential_id = vec![0u8; 32];
        OsRng.fill_bytes(&mut credential_id);
        Self {
            key,
            credential_id,
            aaguid: [0x5a; 16],
            counter: 0,
            counter_step: 1,
            user_verified: true,
            backup_eligible: false,
            backup_state: false,
            attestation: SoftAttestation::None,
            origin: None,
            rp_id: None,
            send_user_handle: true,
            user_handle: None,
        }
    }

    pub fn es256() -> Self {
        Self::with_key(SoftKey::Es256(p256::ecdsa::SigningKey::random(&mut OsRng)))
    }

    pub fn ed25519() -> Self {
        Self::with_key(SoftKey::Ed25519(ed25519_dalek::SigningKey::generate(
            &mut OsRng,
        )))
    }

    /// Origin reported in client data; defaults to `https://{rp_id}`.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Hash this rp id instead of the one in the options.
    pub fn with_rp_id(mut self, rp_id: impl Into<String>) -> Self {
        self.rp_id = Some(rp_id.into());
        self
    }

    pub fn with_attestation(mut self, attestation: SoftAttestation) -> Self {
        self.attestation = attestation;
        self
    }

    /// Counter reported at registration.
    pub fn with_counter(mut self, counter: u32) -> Self {
        self.counter = counter;
        self
    }

    /// Report a counter of zero on every ceremony.
    pub fn counterless(mut self) -> Self {
        self.counter = 0;
        self.counter_step = 0;
        self
    }

    pub fn without_user_verification(mut self) -> Self {
        self.user_verified = false;
        self
    }

    pub fn with_backup(mut self, eligible: bool, state: bool) -> Self {
        self.backup_eligible = eligible;
        self.backup_state = state;
        self
    }

    pub fn without_user_handle(mut self) -> Self {
        self.send_user_handle = false;
        self
    }

    pub fn credential_id(&self) -> &[u8] {
        &self.credential_id
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Force the next assertion to report `counter`.
    pub fn set_counter(&mut self, counter: u32) {
        self.counter = counter.wrapping_sub(self.counter_step);
    }

    pub fn cose_key(&self) -> CoseKey {
        self.key.cose_key()
    }

    pub fn register(&mut self, options: &PublicKeyCredentialCreationOptions) -> RegistrationResponse {
        self.user_handle = Some(options.user.id.as_slice().to_vec());
        let rp_id = self.rp_id.clone().unwrap_or_else(|| options.rp.id.clone());
        let client_data_json =
            self.client_data(CLIENT_DATA_CREATE, options.challenge.as_slice(), &rp_id);

        let cose_key = self.key.cose_key().to_cbor();
        let mut auth_data = self.auth_data_header(&rp_id, AuthenticatorFlags::ATTESTED_CREDENTIAL_DATA);
        auth_data.extend_from_slice(&self.aaguid);
        auth_data.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
        auth_data.extend_from_slice(&self.credential_id);
        auth_data.extend_from_slice(&cose_key);

        let att_stmt = match self.attestation {
            SoftAttestation::None => Vec::new(),
            SoftAttestation::PackedSelf => {
                let mut signed = auth_data.clone();
                signed.extend_from_slice(&sha256(&client_data_json));
                let alg = self.key.cose_key().algorithm.id();
                vec![
                    (Value::Text("alg".into()), Value::Integer(Integer::from(alg))),
                    (Value::Text("sig".into()), Value::Bytes(self.key.sign(&signed))),
                ]
            }
        };
        let fmt = match self.attestation {
            SoftAttestation::None => "none",
            SoftAttestation::PackedSelf => "packed",
        };
        let object = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text(fmt.into())),
            (Value::Text("attStmt".into()), Value::Map(att_stmt)),
            (Value::Text("authData".into()), Value::Bytes(auth_data)),
        ]);
        let mut attestation_object = Vec::new();
        let _ = ciborium::ser::into_writer(&object, &mut attestation_object);

        RegistrationResponse {
            id: encode_base64url(&self.credential_id),
            raw_id: Base64UrlBytes(self.credential_id.clone()),
            type_: "public-key".into(),
            response: AuthenticatorAttestationResponse {
                client_data_json: Base64UrlBytes(client_data_json),
                attestation_object: Base64UrlBytes(attestation_object),
                transports: vec!["internal".into(), "hybrid".into()],
            },
            authenticator_attachment: Some("platform".into()),
            client_extension_results: None,
        }
    }

    pub fn authenticate(
        &mut self,
        options: &PublicKeyCredentialRequestOptions,
    ) -> AuthenticationResponse {
        self.counter = self.counter.wrapping_add(self.counter_step);
        let rp_id = self.rp_id.clone().unwrap_or_else(|| options.rp_id.clone());
        let client_data_json = self.client_data(CLIENT_DATA_GET, options.challenge.as_slice(), &rp_id);
        let auth_data = self.auth_data_header(&rp_id, 0);

        let mut signed = auth_data.clone();
        signed.extend_from_slice(&sha256(&client_data_json));
        let signature = self.key.sign(&signed);

        AuthenticationResponse {
            id: encode_base64url(&self.credential_id),
            raw_id: Base64UrlBytes(self.credential_id.clone()),
            type_: "public-key".into(),
            response: AuthenticatorAssertionResponse {
                client_data_json: Base64UrlBytes(client_data_json),
                authenticator_data: Base64UrlBytes(auth_data),
                signature: Base64UrlBytes(signature),
                user_handle: if self.send_user_handle {
                    self.user_handle.clone().map(Base64UrlBytes)
                } else {
                    None
                },
            },
            authenticator_attachment: None,
            client_extension_results: None,
        }
    }

    fn client_data(&self, type_: &str, challenge: &[u8], rp_id: &str) -> Vec<u8> {
        let client_data = CollectedClientData {
            type_: type_.to_string(),
            challenge: encode_base64url(challenge),
            origin: self
                .origin
                .clone()
                .unwrap_or_else(|| format!("https://{rp_id}")),
            cross_origin: Some(false),
            top_origin: None,
        };
        serde_json::to_vec(&client_data).unwrap_or_default()
    }

    fn auth_data_header(&self, rp_id: &str, extra_flags: u8) -> Vec<u8> {
        let mut flags = AuthenticatorFlags::USER_PRESENT | extra_flags;
        if self.user_verified {
            flags |= AuthenticatorFlags::USER_VERIFIED;
        }
        if self.backup_eligible {
            flags |= AuthenticatorFlags::BACKUP_ELIGIBLE;
        }
        if self.backup_state {
            flags |= AuthenticatorFlags::BACKUP_STATE;
        }
        let mut out = sha256(rp_id.as_bytes()).to_vec();
        out.push(flags);
        out.extend_from_slice(&self.counter.to_be_bytes());
        out
    }
}

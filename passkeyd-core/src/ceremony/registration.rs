use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::{check_authenticator_data, check_client_data, parse_client_data, RelyingParty};
use crate::audit::{AuditOperation, AuditTrail};
use crate::crypto::{sha256, AttestationObject, CoseAlgorithm};
use crate::error::{CeremonyError, Result, MAX_NAME_LEN};
use crate::model::{CeremonyKind, ChallengeSession, Credential, CredentialId, TenantId, WebauthnUser};
use crate::tenant::ResidentKeyRequirement;
use crate::wire::{
    AuthenticatorSelectionCriteria, Base64UrlBytes, PublicKeyCredentialCreationOptions,
    PublicKeyCredentialDescriptor, PublicKeyCredentialParameters, RegistrationChallenge,
    RegistrationResponse, RelyingPartyEntity, UserEntity, CLIENT_DATA_CREATE,
};

/// Who is enrolling a passkey.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegistrationRequest {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

impl RegistrationRequest {
    fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(CeremonyError::invalid_input("user_id is required"));
        }
        if self.username.trim().is_empty() {
            return Err(CeremonyError::invalid_input("username is required"));
        }
        if self.username.chars().count() > MAX_NAME_LEN {
            return Err(CeremonyError::invalid_input(format!(
                "username exceeds {MAX_NAME_LEN} characters"
            )));
        }
        if let Some(display_name) = &self.display_name {
            if display_name.chars().count() > MAX_NAME_LEN {
                return Err(CeremonyError::invalid_input(format!(
                    "display_name exceeds {MAX_NAME_LEN} characters"
                )));
            }
        }
        Ok(())
    }
}

impl RelyingParty {
    /// Begin enrolling a new credential for `request.user_id`.
    #[tracing::instrument(skip(self, request), fields(tenant_id = %tenant_id, user_id = %request.user_id))]
    pub async fn start_registration(
        &self,
        tenant_id: TenantId,
        request: RegistrationRequest,
    ) -> Result<RegistrationChallenge> {
        let mut trail = AuditTrail::new(tenant_id, AuditOperation::RegistrationInit);
        trail.actor(request.user_id.clone());
        let result = self.start_registration_inner(tenant_id, request, &mut trail).await;
        trail.finish(self.audit.as_ref(), result)
    }

    async fn start_registration_inner(
        &self,
        tenant_id: TenantId,
        request: RegistrationRequest,
        trail: &mut AuditTrail,
    ) -> Result<RegistrationChallenge> {
        request.validate()?;
        let tenant = self.tenant(tenant_id).await?;

        let user = self
            .users
            .upsert(WebauthnUser {
                tenant_id,
                user_id: request.user_id,
                username: request.username,
                display_name: request.display_name,
                icon: request.icon,
                created_at: Utc::now(),
            })
            .await?;

        let existing = self.credentials.list(tenant_id, &user.user_id).await?;
        let challenge = self.fresh_challenge().await?;

        let now = Utc::now();
        let session = ChallengeSession {
            id: Uuid::new_v4(),
            tenant_id,
            user_id: Some(user.user_id.clone()),
            challenge: challenge.clone(),
            kind: CeremonyKind::Registration,
            credential_ids: existing.iter().map(|c| c.id.clone()).collect(),
            created_at: now,
            expires_at: now,
        };
        let session_id = session.id;
        trail.note("session_id", session_id);
        self.sessions.put(session, self.challenge_ttl).await?;

        let options = PublicKeyCredentialCreationOptions {
            rp: RelyingPartyEntity {
                id: tenant.rp_id.clone(),
                name: tenant.rp_name.clone(),
                icon: tenant.icon.clone(),
            },
            user: UserEntity {
                id: Base64UrlBytes(user.user_handle()),
                name: user.username.clone(),
                display_name: user.display_name_or_username().to_string(),
                icon: user.icon.clone(),
            },
            challenge: Base64UrlBytes(challenge),
            pub_key_cred_params: CoseAlgorithm::SUPPORTED
                .iter()
                .copied()
                .map(PublicKeyCredentialParameters::from)
                .collect(),
            timeout: Some(tenant.timeout_ms),
            exclude_credentials: existing
                .into_iter()
                .map(|c| PublicKeyCredentialDescriptor::new(c.id, c.transports))
                .collect(),
            authenticator_selection: AuthenticatorSelectionCriteria {
                authenticator_attachment: tenant.authenticator_attachment,
                resident_key: tenant.resident_key,
                require_resident_key: tenant.resident_key == ResidentKeyRequirement::Required,
                user_verification: tenant.user_verification,
            },
            attestation: tenant.attestation,
        };

        tracing::info!(
            session_id = %session_id,
            excluded = options.exclude_credentials.len(),
            "Registration challenge issued"
        );

        Ok(RegistrationChallenge {
            session_id,
            public_key: options,
        })
    }

    /// Verify an attestation response and enroll the credential.
    #[tracing::instrument(skip(self, response), fields(tenant_id = %tenant_id))]
    pub async fn finish_registration(
        &self,
        tenant_id: TenantId,
        response: &RegistrationResponse,
    ) -> Result<Credential> {
        let mut trail = AuditTrail::new(tenant_id, AuditOperation::RegistrationFinish);
        let result = self.finish_registration_inner(tenant_id, response, &mut trail).await;
        if let Err(err) = &result {
            tracing::warn!(error = %err, "Registration failed");
        }
        trail.finish(self.audit.as_ref(), result)
    }

    async fn finish_registration_inner(
        &self,
        tenant_id: TenantId,
        response: &RegistrationResponse,
        trail: &mut AuditTrail,
    ) -> Result<Credential> {
        let tenant = self.tenant(tenant_id).await?;
        let client_data_json = response.response.client_data_json.as_slice();
        let (client_data, challenge) = parse_client_data(client_data_json)?;

        let session = self
            .sessions
            .get_and_consume(tenant_id, &challenge)
            .await?
            .ok_or(CeremonyError::ChallengeExpired)?;
        trail.note("session_id", session.id);
        if let Some(user_id) = &session.user_id {
            trail.actor(user_id.clone());
        }

        // From here on the session is gone; every failure is final
        if session.kind != CeremonyKind::Registration {
            return Err(CeremonyError::verification(format!(
                "session was issued for {}",
                session.kind.as_str()
            )));
        }
        let user_id = session
            .user_id
            .clone()
            .ok_or_else(|| CeremonyError::verification("registration session has no user"))?;

        check_client_data(
            &tenant,
            &client_data,
            CLIENT_DATA_CREATE,
            &challenge,
            &session.challenge,
        )?;

        let attestation =
            AttestationObject::from_cbor(response.response.attestation_object.as_slice())?;
        check_authenticator_data(&tenant, &attestation.auth_data)?;
        let attested = attestation.attested_credential()?;

        if attested.credential_id != response.raw_id.as_slice() {
            return Err(CeremonyError::verification(
                "rawId does not match attested credential id",
            ));
        }
        let id = CredentialId::new(attested.credential_id.clone());
        if CredentialId::from_base64url(&response.id).as_ref() != Some(&id) {
            return Err(CeremonyError::verification("id does not match rawId"));
        }
        trail.note("credential_id", &id);

        let client_data_hash = sha256(client_data_json);
        let attestation_type = attestation.verify(&client_data_hash)?;

        let flags = attestation.auth_data.flags;
        let credential = Credential {
            id,
            tenant_id,
            user_id,
            public_key: attested.public_key_bytes.clone(),
            algorithm: attested.public_key.algorithm,
            sign_counter: attestation.auth_data.sign_count,
            transports: response.transports(),
            backup_eligible: flags.backup_eligible(),
            backup_state: flags.backup_state(),
            attestation_type,
            aaguid: attested.aaguid,
            created_at: Utc::now(),
            last_used_at: None,
            name: None,
        };
        self.credentials.create(credential.clone()).await?;

        tracing::info!(
            session_id = %session.id,
            credential_id = %credential.id,
            algorithm = credential.algorithm.name(),
            attestation = credential.attestation_type.as_str(),
            sign_count = credential.sign_counter,
            "Credential registered"
        );
        Ok(credential)
    }
}

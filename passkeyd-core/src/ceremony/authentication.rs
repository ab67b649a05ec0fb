use chrono::Utc;
use uuid::Uuid;

use super::{check_authenticator_data, check_client_data, parse_client_data, RelyingParty};
use crate::audit::{AuditOperation, AuditTrail};
use crate::crypto::{constant_time_eq, sha256, AuthenticatorData, CoseKey};
use crate::error::{CeremonyError, Result};
use crate::model::{CeremonyKind, ChallengeSession, Credential, CounterUpdate, CredentialId, TenantId};
use crate::store::{counter_advances, StoreError};
use crate::wire::{
    AuthenticationChallenge, AuthenticationResponse, Base64UrlBytes,
    PublicKeyCredentialDescriptor, PublicKeyCredentialRequestOptions, CLIENT_DATA_GET,
};

impl RelyingParty {
    /// Begin an authentication ceremony.
    ///
    /// With a `user_id` the options list that user's credentials. Without one
    /// the allow list is empty and the authenticator picks a discoverable
    /// credential.
    #[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn start_authentication(
        &self,
        tenant_id: TenantId,
        user_id: Option<&str>,
    ) -> Result<AuthenticationChallenge> {
        let mut trail = AuditTrail::new(tenant_id, AuditOperation::AuthenticationInit);
        if let Some(user_id) = user_id {
            trail.actor(user_id);
        }
        let result = self.start_authentication_inner(tenant_id, user_id, &mut trail).await;
        trail.finish(self.audit.as_ref(), result)
    }

    async fn start_authentication_inner(
        &self,
        tenant_id: TenantId,
        user_id: Option<&str>,
        trail: &mut AuditTrail,
    ) -> Result<AuthenticationChallenge> {
        let tenant = self.tenant(tenant_id).await?;

        let allow_credentials: Vec<PublicKeyCredentialDescriptor> = match user_id {
            Some(user_id) => {
                if user_id.trim().is_empty() {
                    return Err(CeremonyError::invalid_input("user_id must not be blank"));
                }
                if self.users.get(tenant_id, user_id).await?.is_none() {
                    return Err(CeremonyError::NotFound(format!("user {user_id}")));
                }
                let credentials = self.credentials.list(tenant_id, user_id).await?;
                if credentials.is_empty() {
                    return Err(CeremonyError::NotFound(format!(
                        "no credentials registered for user {user_id}"
                    )));
                }
                credentials
                    .into_iter()
                    .map(|c| PublicKeyCredentialDescriptor::new(c.id, c.transports))
                    .collect()
            }
            None => Vec::new(),
        };

        let challenge = self.fresh_challenge().await?;
        let now = Utc::now();
        let session = ChallengeSession {
            id: Uuid::new_v4(),
            tenant_id,
            user_id: user_id.map(str::to_string),
            challenge: challenge.clone(),
            kind: CeremonyKind::Authentication,
            credential_ids: allow_credentials
                .iter()
                .map(|d| d.id.clone())
                .collect(),
            created_at: now,
            expires_at: now,
        };
        let session_id = session.id;
        trail.note("session_id", session_id);
        self.sessions.put(session, self.challenge_ttl).await?;

        tracing::info!(
            session_id = %session_id,
            allowed = allow_credentials.len(),
            discoverable = user_id.is_none(),
            "Authentication challenge issued"
        );

        Ok(AuthenticationChallenge {
            session_id,
            public_key: PublicKeyCredentialRequestOptions {
                challenge: Base64UrlBytes(challenge),
                timeout: Some(tenant.timeout_ms),
                rp_id: tenant.rp_id,
                allow_credentials,
                user_verification: tenant.user_verification,
            },
        })
    }

    /// Verify an assertion and advance the credential's signature counter.
    #[tracing::instrument(skip(self, response), fields(tenant_id = %tenant_id))]
    pub async fn finish_authentication(
        &self,
        tenant_id: TenantId,
        response: &AuthenticationResponse,
    ) -> Result<Credential> {
        let mut trail = AuditTrail::new(tenant_id, AuditOperation::AuthenticationFinish);
        let result = self
            .finish_authentication_inner(tenant_id, response, &mut trail)
            .await;
        match &result {
            Err(CeremonyError::CloneDetected { stored, received }) => tracing::error!(
                stored,
                received,
                "Signature counter did not advance, possible cloned authenticator"
            ),
            Err(err) => tracing::warn!(error = %err, "Authentication failed"),
            Ok(_) => {}
        }
        trail.finish(self.audit.as_ref(), result)
    }

    async fn finish_authentication_inner(
        &self,
        tenant_id: TenantId,
        response: &AuthenticationResponse,
        trail: &mut AuditTrail,
    ) -> Result<Credential> {
        let tenant = self.tenant(tenant_id).await?;
        let assertion = &response.response;
        let client_data_json = assertion.client_data_json.as_slice();
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

        if session.kind != CeremonyKind::Authentication {
            return Err(CeremonyError::verification(format!(
                "session was issued for {}",
                session.kind.as_str()
            )));
        }

        let credential_id = CredentialId::new(response.raw_id.as_slice());
        if CredentialId::from_base64url(&response.id).as_ref() != Some(&credential_id) {
            return Err(CeremonyError::verification("id does not match rawId"));
        }
        trail.note("credential_id", &credential_id);

        let credential = self
            .credentials
            .get(tenant_id, &credential_id)
            .await?
            .ok_or_else(|| CeremonyError::UnknownCredential(credential_id.to_base64url()))?;
        trail.actor(credential.user_id.clone());

        if !session.credential_ids.is_empty() && !session.credential_ids.contains(&credential_id) {
            return Err(CeremonyError::verification("credential not in allow list"));
        }

        check_owner(&session, &credential, assertion.user_handle.as_ref())?;
        check_client_data(
            &tenant,
            &client_data,
            CLIENT_DATA_GET,
            &challenge,
            &session.challenge,
        )?;

        let auth_data_bytes = assertion.authenticator_data.as_slice();
        let auth_data = AuthenticatorData::parse(auth_data_bytes)?;
        check_authenticator_data(&tenant, &auth_data)?;

        let key = CoseKey::from_cbor(&credential.public_key)?;
        let mut signed = Vec::with_capacity(auth_data_bytes.len() + 32);
        signed.extend_from_slice(auth_data_bytes);
        signed.extend_from_slice(&sha256(client_data_json));
        key.verify(&signed, assertion.signature.as_slice())?;

        let received = auth_data.sign_count;
        if !counter_advances(credential.sign_counter, received) {
            return Err(CeremonyError::CloneDetected {
                stored: credential.sign_counter,
                received,
            });
        }

        let update = CounterUpdate {
            sign_counter: received,
            backup_state: auth_data.flags.backup_state(),
            used_at: Utc::now(),
        };
        let updated = self
            .credentials
            .advance_counter(tenant_id, &credential_id, update)
            .await
            .map_err(|err| match err {
                // Deleted between read and write
                StoreError::NotFound(_) => {
                    CeremonyError::UnknownCredential(credential_id.to_base64url())
                }
                other => other.into(),
            })?;

        tracing::info!(
            session_id = %session.id,
            credential_id = %updated.id,
            sign_count = updated.sign_counter,
            "Authentication succeeded"
        );
        Ok(updated)
    }
}

/// The credential must belong to the session user and to `userHandle`.
fn check_owner(
    session: &ChallengeSession,
    credential: &Credential,
    user_handle: Option<&Base64UrlBytes>,
) -> Result<()> {
    if let Some(user_id) = &session.user_id {
        if &credential.user_id != user_id {
            return Err(CeremonyError::verification(
                "credential belongs to a different user",
            ));
        }
    }
    match user_handle {
        Some(handle) => {
            if !constant_time_eq(handle.as_slice(), credential.user_id.as_bytes()) {
                return Err(CeremonyError::verification("user handle mismatch"));
            }
        }
        None if session.user_id.is_none() => {
            return Err(CeremonyError::verification(
                "user handle required for discoverable login",
            ));
        }
        None => {}
    }
    Ok(())
}

//! Registration and authentication ceremony controllers.
//!
//! A [`RelyingParty`] holds no per-ceremony state: everything in flight lives
//! in the challenge session store, and every call resolves its tenant anew.

mod authentication;
mod management;
mod registration;


pub use registration::RegistrationRequest;

use std::sync::Arc;
use std::time::Duration;

use crate::audit::{AuditSink, TracingAuditSink};
use crate::crypto::{constant_time_eq, sha256, AuthenticatorData};
use crate::entropy::{EntropySource, OsEntropy};
use crate::error::{CeremonyError, Result, MIN_CHALLENGE_LEN};
use crate::model::TenantId;
use crate::store::{
    ChallengeSessionStore, CredentialStore, MemoryChallengeStore, MemoryCredentialStore,
    MemoryUserStore, UserStore,
};
use crate::tenant::{TenantConfig, TenantConfigProvider, UserVerificationRequirement};
use crate::wire::CollectedClientData;

/// Default lifetime of a challenge session
pub const DEFAULT_CHALLENGE_TTL: Duration = Duration::from_secs(300);

/// WebAuthn relying party serving every configured tenant.
#[derive(Clone)]
pub struct RelyingParty {
    tenants: Arc<dyn TenantConfigProvider>,
    credentials: Arc<dyn CredentialStore>,
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn ChallengeSessionStore>,
    entropy: Arc<dyn EntropySource>,
    audit: Arc<dyn AuditSink>,
    challenge_ttl: Duration,
}

impl RelyingParty {
    pub fn builder(tenants: Arc<dyn TenantConfigProvider>) -> RelyingPartyBuilder {
        RelyingPartyBuilder {
            tenants,
            credentials: None,
            users: None,
            sessions: None,
            entropy: None,
            audit: None,
            challenge_ttl: DEFAULT_CHALLENGE_TTL,
        }
    }

    /// All stores in memory, OS entropy, tracing audit.
    pub fn in_memory(tenants: Arc<dyn TenantConfigProvider>) -> Self {
        Self::builder(tenants).build()
    }

    pub fn sessions(&self) -> &Arc<dyn ChallengeSessionStore> {
        &self.sessions
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    pub fn challenge_ttl(&self) -> Duration {
        self.challenge_ttl
    }

    async fn tenant(&self, tenant_id: TenantId) -> Result<TenantConfig> {
        Ok(self.tenants.get(tenant_id).await?)
    }

    async fn fresh_challenge(&self) -> Result<Vec<u8>> {
        let challenge = self.entropy.challenge().await?;
        if challenge.len() < MIN_CHALLENGE_LEN {
            return Err(CeremonyError::Entropy(format!(
                "{} source returned {} bytes",
                self.entropy.source_id(),
                challenge.len()
            )));
        }
        Ok(challenge)
    }
}

impl std::fmt::Debug for RelyingParty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelyingParty")
            .field("entropy", &self.entropy.source_id())
            .field("challenge_ttl", &self.challenge_ttl)
            .finish_non_exhaustive()
    }
}

pub struct RelyingPartyBuilder {
    tenants: Arc<dyn TenantConfigProvider>,
    credentials: Option<Arc<dyn CredentialStore>>,
    users: Option<Arc<dyn UserStore>>,
    sessions: Option<Arc<dyn ChallengeSessionStore>>,
    entropy: Option<Arc<dyn EntropySource>>,
    audit: Option<Arc<dyn AuditSink>>,
    challenge_ttl: Duration,
}

impl RelyingPartyBuilder {
    pub fn credentials(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    pub fn users(mut self, store: Arc<dyn UserStore>) -> Self {
        self.users = Some(store);
        self
    }

    pub fn sessions(mut self, store: Arc<dyn ChallengeSessionStore>) -> Self {
        self.sessions = Some(store);
        self
    }

    pub fn entropy(mut self, source: Arc<dyn EntropySource>) -> Self {
        self.entropy = Some(source);
        self
    }

    pub fn audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn challenge_ttl(mut self, ttl: Duration) -> Self {
        self.challenge_ttl = ttl;
        self
    }

    pub fn build(self) -> RelyingParty {
        RelyingParty {
            tenants: self.tenants,
            credentials: self
                .credentials
                .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new())),
            users: self.users.unwrap_or_else(|| Arc::new(MemoryUserStore::new())),
            sessions: self
                .sessions
                .unwrap_or_else(|| Arc::new(MemoryChallengeStore::new())),
            entropy: self.entropy.unwrap_or_else(|| Arc::new(OsEntropy)),
            audit: self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink)),
            challenge_ttl: self.challenge_ttl,
        }
    }
}

/// Decode `clientDataJSON` and the challenge it carries.
///
/// Without a decodable challenge no session can be identified, so failures
/// here are input errors rather than verification failures.
fn parse_client_data(client_data_json: &[u8]) -> Result<(CollectedClientData, Vec<u8>)> {
    let client_data = CollectedClientData::from_json(client_data_json)
        .map_err(|e| CeremonyError::invalid_input(format!("clientDataJSON: {e}")))?;
    let challenge = client_data
        .challenge_bytes()
        .map_err(|e| CeremonyError::invalid_input(format!("challenge: {e}")))?;
    Ok((client_data, challenge))
}

fn check_client_data(
    tenant: &TenantConfig,
    client_data: &CollectedClientData,
    expected_type: &str,
    received_challenge: &[u8],
    session_challenge: &[u8],
) -> Result<()> {
    if client_data.type_ != expected_type {
        return Err(CeremonyError::verification(format!(
            "client data type {} (expected {expected_type})",
            client_data.type_
        )));
    }
    if !constant_time_eq(received_challenge, session_challenge) {
        return Err(CeremonyError::verification("challenge mismatch"));
    }
    if !tenant.is_allowed_origin(&client_data.origin) {
        return Err(CeremonyError::verification(format!(
            "origin {} not allowed",
            client_data.origin
        )));
    }
    if client_data.cross_origin == Some(true) {
        return Err(CeremonyError::verification("cross-origin request"));
    }
    Ok(())
}

fn check_authenticator_data(tenant: &TenantConfig, auth_data: &AuthenticatorData) -> Result<()> {
    if !constant_time_eq(&auth_data.rp_id_hash, &sha256(tenant.rp_id.as_bytes())) {
        return Err(CeremonyError::verification("rp id hash mismatch"));
    }
    if !auth_data.flags.user_present() {
        return Err(CeremonyError::verification("user presence flag not set"));
    }
    if tenant.user_verification == UserVerificationRequirement::Required
        && !auth_data.flags.user_verified()
    {
        return Err(CeremonyError::verification("user verification required"));
    }
    Ok(())
}

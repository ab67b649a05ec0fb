//! Persistence contracts used by the ceremony controllers.
//!
//! - **Credentials** are durable and keyed by `(tenant_id, credential_id)`.
//! - **Challenge sessions** are short-lived and consumed exactly once.
//! - **Users** are resolved or created at registration.
//!
//! [`memory`] provides DashMap-backed engines for all three. The server crate
//! adds a PostgreSQL engine for credentials and users.

pub mod memory;

pub use memory::{MemoryChallengeStore, MemoryCredentialStore, MemoryUserStore};

use std::time::Duration;

use async_trait::async_trait;

use crate::model::{
    ChallengeSession, Credential, CounterUpdate, CredentialId, TenantId, WebauthnUser,
};

/// Storage errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Counter regression: stored {stored}, received {received}")]
    CounterRegression { stored: u32, received: u32 },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Commit rule for signature counters: strictly increasing, except that
/// authenticators without a counter report zero forever.
pub fn counter_advances(stored: u32, received: u32) -> bool {
    received > stored || (stored == 0 && received == 0)
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(
        &self,
        tenant_id: TenantId,
        credential_id: &CredentialId,
    ) -> Result<Option<Credential>, StoreError>;

    /// Fails with [`StoreError::Conflict`] if the id is already enrolled for the tenant.
    async fn create(&self, credential: Credential) -> Result<(), StoreError>;

    /// Replace the mutable fields (name, counter, last use, backup state).
    ///
    /// A counter lower than the stored one is rejected.
    async fn update(&self, credential: Credential) -> Result<(), StoreError>;

    /// Set only the display name, leaving counter and usage fields as stored.
    async fn rename(
        &self,
        tenant_id: TenantId,
        credential_id: &CredentialId,
        name: &str,
    ) -> Result<Credential, StoreError>;

    /// Conditional counter write; the comparison happens against the value
    /// stored at write time. Returns the updated credential.
    async fn advance_counter(
        &self,
        tenant_id: TenantId,
        credential_id: &CredentialId,
        update: CounterUpdate,
    ) -> Result<Credential, StoreError>;

    /// Idempotent.
    async fn delete(&self, tenant_id: TenantId, credential_id: &CredentialId)
        -> Result<(), StoreError>;

    /// Credentials of one user, oldest first.
    async fn list(&self, tenant_id: TenantId, user_id: &str) -> Result<Vec<Credential>, StoreError>;
}

#[async_trait]
pub trait ChallengeSessionStore: Send + Sync {
    /// Store `session`; it expires `ttl` after its creation time.
    async fn put(&self, session: ChallengeSession, ttl: Duration) -> Result<(), StoreError>;

    /// Atomically fetch and delete the session for `challenge`.
    ///
    /// Exactly one concurrent caller observes a given session. Expired
    /// sessions are dropped and reported absent.
    async fn get_and_consume(
        &self,
        tenant_id: TenantId,
        challenge: &[u8],
    ) -> Result<Option<ChallengeSession>, StoreError>;

    /// Drop expired sessions, returning how many were removed.
    async fn sweep_expired(&self) -> Result<usize, StoreError>;

    async fn len(&self) -> Result<usize, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, tenant_id: TenantId, user_id: &str)
        -> Result<Option<WebauthnUser>, StoreError>;

    /// Insert or refresh a user. An existing record keeps its `created_at`.
    async fn upsert(&self, user: WebauthnUser) -> Result<WebauthnUser, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_rule() {
        assert!(counter_advances(0, 0));
        assert!(counter_advances(0, 1));
        assert!(counter_advances(41, 42));
        assert!(!counter_advances(42, 42));
        assert!(!counter_advances(42, 7));
        assert!(!counter_advances(5, 0));
    }
}

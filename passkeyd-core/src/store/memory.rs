//! In-memory stores backed by DashMap.
//!
//! Challenge sessions always live here; credentials and users only in
//! development or tests (they are lost on restart).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{
    counter_advances, ChallengeSessionStore, CredentialStore, StoreError, UserStore,
};
use crate::model::{
    ChallengeSession, Credential, CounterUpdate, CredentialId, TenantId, WebauthnUser,
};

struct CredentialEntry {
    credential: Credential,
    /// Insertion order, breaks `created_at` ties in listings
    seq: u64,
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: DashMap<(TenantId, CredentialId), CredentialEntry>,
    next_seq: AtomicU64,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.credentials.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(
        &self,
        tenant_id: TenantId,
        credential_id: &CredentialId,
    ) -> Result<Option<Credential>, StoreError> {
        Ok(self
            .credentials
            .get(&(tenant_id, credential_id.clone()))
            .map(|entry| entry.credential.clone()))
    }

    async fn create(&self, credential: Credential) -> Result<(), StoreError> {
        let key = (credential.tenant_id, credential.id.clone());
        match self.credentials.entry(key) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "credential {}",
                credential.id
            ))),
            Entry::Vacant(slot) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                slot.insert(CredentialEntry { credential, seq });
                Ok(())
            }
        }
    }

    async fn update(&self, credential: Credential) -> Result<(), StoreError> {
        let key = (credential.tenant_id, credential.id.clone());
        let mut entry = self
            .credentials
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(format!("credential {}", credential.id)))?;

        let stored = &mut entry.credential;
        if credential.sign_counter < stored.sign_counter {
            return Err(StoreError::CounterRegression {
                stored: stored.sign_counter,
                received: credential.sign_counter,
            });
        }
        stored.name = credential.name;
        stored.sign_counter = credential.sign_counter;
        stored.last_used_at = credential.last_used_at;
        stored.backup_state = credential.backup_state;
        Ok(())
    }

    async fn rename(
        &self,
        tenant_id: TenantId,
        credential_id: &CredentialId,
        name: &str,
    ) -> Result<Credential, StoreError> {
        let mut entry = self
            .credentials
            .get_mut(&(tenant_id, credential_id.clone()))
            .ok_or_else(|| StoreError::NotFound(format!("credential {credential_id}")))?;
        entry.credential.name = Some(name.to_string());
        Ok(entry.credential.clone())
    }

    async fn advance_counter(
        &self,
        tenant_id: TenantId,
        credential_id: &CredentialId,
        update: CounterUpdate,
    ) -> Result<Credential, StoreError> {
        // The shard write lock makes compare-and-set atomic
        let mut entry = self
            .credentials
            .get_mut(&(tenant_id, credential_id.clone()))
            .ok_or_else(|| StoreError::NotFound(format!("credential {credential_id}")))?;

        let stored = &mut entry.credential;
        if !counter_advances(stored.sign_counter, update.sign_counter) {
            return Err(StoreError::CounterRegression {
                stored: stored.sign_counter,
                received: update.sign_counter,
            });
        }
        stored.sign_counter = update.sign_counter;
        stored.backup_state = update.backup_state;
        stored.last_used_at = Some(update.used_at);
        Ok(stored.clone())
    }

    async fn delete(
        &self,
        tenant_id: TenantId,
        credential_id: &CredentialId,
    ) -> Result<(), StoreError> {
        self.credentials.remove(&(tenant_id, credential_id.clone()));
        Ok(())
    }

    async fn list(&self, tenant_id: TenantId, user_id: &str) -> Result<Vec<Credential>, StoreError> {
        let mut matching: Vec<(u64, Credential)> = self
            .credentials
            .iter()
            .filter(|entry| {
                entry.credential.tenant_id == tenant_id && entry.credential.user_id == user_id
            })
            .map(|entry| (entry.seq, entry.credential.clone()))
            .collect();
        matching.sort_by(|(a_seq, a), (b_seq, b)| {
            a.created_at.cmp(&b.created_at).then(a_seq.cmp(b_seq))
        });
        Ok(matching.into_iter().map(|(_, credential)| credential).collect())
    }
}

impl std::fmt::Debug for MemoryCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCredentialStore")
            .field("credentials", &self.credentials.len())
            .finish()
    }
}

/// Pending ceremonies keyed by `(tenant_id, challenge)`.
#[derive(Default)]
pub struct MemoryChallengeStore {
    sessions: DashMap<(TenantId, Vec<u8>), ChallengeSession>,
}

impl MemoryChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChallengeSessionStore for MemoryChallengeStore {
    async fn put(&self, mut session: ChallengeSession, ttl: Duration) -> Result<(), StoreError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|_| StoreError::Unavailable("challenge ttl out of range".into()))?;
        session.expires_at = session.created_at + ttl;
        self.sessions
            .insert((session.tenant_id, session.challenge.clone()), session);
        Ok(())
    }

    async fn get_and_consume(
        &self,
        tenant_id: TenantId,
        challenge: &[u8],
    ) -> Result<Option<ChallengeSession>, StoreError> {
        let Some((_, session)) = self.sessions.remove(&(tenant_id, challenge.to_vec())) else {
            return Ok(None);
        };
        if session.is_expired() {
            tracing::debug!(session_id = %session.id, "Discarding expired challenge session");
            return Ok(None);
        }
        Ok(Some(session))
    }

    async fn sweep_expired(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired_at(now));
        Ok(before.saturating_sub(self.sessions.len()))
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.sessions.len())
    }
}

impl std::fmt::Debug for MemoryChallengeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryChallengeStore")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: DashMap<(TenantId, String), WebauthnUser>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get(
        &self,
        tenant_id: TenantId,
        user_id: &str,
    ) -> Result<Option<WebauthnUser>, StoreError> {
        Ok(self
            .users
            .get(&(tenant_id, user_id.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn upsert(&self, user: WebauthnUser) -> Result<WebauthnUser, StoreError> {
        let key = (user.tenant_id, user.user_id.clone());
        let stored = match self.users.entry(key) {
            Entry::Occupied(mut existing) => {
                let record = existing.get_mut();
                record.username = user.username;
                record.display_name = user.display_name;
                record.icon = user.icon;
                record.clone()
            }
            Entry::Vacant(slot) => slot.insert(user).value().clone(),
        };
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CoseAlgorithm;
    use crate::model::{AttestationType, CeremonyKind};
    use std::sync::Arc;
    use uuid::Uuid;

    fn credential(tenant_id: TenantId, id: u8, user_id: &str) -> Credential {
        Credential {
            id: CredentialId::new(vec![id; 16]),
            tenant_id,
            user_id: user_id.to_string(),
            public_key: vec![0xa5],
            algorithm: CoseAlgorithm::Es256,
            sign_counter: 0,
            transports: Vec::new(),
            backup_eligible: false,
            backup_state: false,
            attestation_type: AttestationType::None,
            aaguid: Uuid::nil(),
            created_at: Utc::now(),
            last_used_at: None,
            name: None,
        }
    }

    fn session(tenant_id: TenantId, challenge: &[u8]) -> ChallengeSession {
        let now = Utc::now();
        ChallengeSession {
            id: Uuid::new_v4(),
            tenant_id,
            user_id: Some("alice".into()),
            challenge: challenge.to_vec(),
            kind: CeremonyKind::Registration,
            credential_ids: Vec::new(),
            created_at: now,
            expires_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_conflict_is_per_tenant() {
        let store = MemoryCredentialStore::new();
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();

        store.create(credential(tenant_a, 1, "alice")).await.unwrap();
        assert!(matches!(
            store.create(credential(tenant_a, 1, "alice")).await,
            Err(StoreError::Conflict(_))
        ));
        // Same id under another tenant is a different credential
        store.create(credential(tenant_b, 1, "alice")).await.unwrap();
        assert_eq!(store.count(), 2);
    }

    #[tokio::test]
    async fn test_list_orders_by_creation_then_insertion() {
        let store = MemoryCredentialStore::new();
        let tenant = Uuid::new_v4();
        let created_at = Utc::now();
        for id in [3u8, 1, 2] {
            let mut cred = credential(tenant, id, "alice");
            cred.created_at = created_at;
            store.create(cred).await.unwrap();
        }
        store.create(credential(tenant, 9, "bob")).await.unwrap();

        let ids: Vec<u8> = store
            .list(tenant, "alice")
            .await
            .unwrap()
            .iter()
            .map(|c| c.id.as_bytes()[0])
            .collect();
        assert_eq!(ids, vec![3, 1, 2]);
        assert!(store.list(tenant, "carol").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_rejects_counter_regression() {
        let store = MemoryCredentialStore::new();
        let tenant = Uuid::new_v4();
        let mut cred = credential(tenant, 1, "alice");
        cred.sign_counter = 10;
        store.create(cred.clone()).await.unwrap();

        cred.sign_counter = 9;
        assert_eq!(
            store.update(cred.clone()).await,
            Err(StoreError::CounterRegression {
                stored: 10,
                received: 9
            })
        );

        cred.sign_counter = 10;
        cred.name = Some("YubiKey".into());
        store.update(cred.clone()).await.unwrap();
        let stored = store.get(tenant, &cred.id).await.unwrap().unwrap();
        assert_eq!(stored.name.as_deref(), Some("YubiKey"));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = MemoryCredentialStore::new();
        let result = store.update(credential(Uuid::new_v4(), 1, "alice")).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rename_keeps_usage_fields() {
        let store = MemoryCredentialStore::new();
        let tenant = Uuid::new_v4();
        let mut cred = credential(tenant, 1, "alice");
        cred.sign_counter = 5;
        store.create(cred.clone()).await.unwrap();
        store
            .advance_counter(
                tenant,
                &cred.id,
                CounterUpdate {
                    sign_counter: 6,
                    backup_state: true,
                    used_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        let renamed = store.rename(tenant, &cred.id, "Laptop").await.unwrap();
        assert_eq!(renamed.name.as_deref(), Some("Laptop"));
        assert_eq!(renamed.sign_counter, 6);
        assert!(renamed.backup_state);
        assert!(renamed.last_used_at.is_some());

        let missing = store.rename(tenant, &CredentialId::new(vec![42]), "x").await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_advance_counter_is_conditional() {
        let store = MemoryCredentialStore::new();
        let tenant = Uuid::new_v4();
        let mut cred = credential(tenant, 1, "alice");
        cred.sign_counter = 5;
        store.create(cred.clone()).await.unwrap();

        let update = |sign_counter| CounterUpdate {
            sign_counter,
            backup_state: true,
            used_at: Utc::now(),
        };
        let updated = store.advance_counter(tenant, &cred.id, update(6)).await.unwrap();
        assert_eq!(updated.sign_counter, 6);
        assert!(updated.backup_state);
        assert!(updated.last_used_at.is_some());

        assert_eq!(
            store.advance_counter(tenant, &cred.id, update(6)).await,
            Err(StoreError::CounterRegression {
                stored: 6,
                received: 6
            })
        );
        let stored = store.get(tenant, &cred.id).await.unwrap().unwrap();
        assert_eq!(stored.sign_counter, 6);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryCredentialStore::new();
        let tenant = Uuid::new_v4();
        let cred = credential(tenant, 1, "alice");
        store.create(cred.clone()).await.unwrap();
        store.delete(tenant, &cred.id).await.unwrap();
        store.delete(tenant, &cred.id).await.unwrap();
        assert!(store.get(tenant, &cred.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_consumed_once() {
        let store = MemoryChallengeStore::new();
        let tenant = Uuid::new_v4();
        store
            .put(session(tenant, b"challenge-bytes-0001"), Duration::from_secs(300))
            .await
            .unwrap();

        assert!(store
            .get_and_consume(Uuid::new_v4(), b"challenge-bytes-0001")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .get_and_consume(tenant, b"challenge-bytes-0001")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .get_and_consume(tenant, b"challenge-bytes-0001")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_expired_session_reported_absent() {
        let store = MemoryChallengeStore::new();
        let tenant = Uuid::new_v4();
        store
            .put(session(tenant, b"stale"), Duration::ZERO)
            .await
            .unwrap();
        assert!(store.get_and_consume(tenant, b"stale").await.unwrap().is_none());
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_drops_only_expired() {
        let store = MemoryChallengeStore::new();
        let tenant = Uuid::new_v4();
        store.put(session(tenant, b"old"), Duration::ZERO).await.unwrap();
        store
            .put(session(tenant, b"fresh"), Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(store.sweep_expired().await.unwrap(), 1);
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consume_has_single_winner() {
        let store = Arc::new(MemoryChallengeStore::new());
        let tenant = Uuid::new_v4();
        store
            .put(session(tenant, b"contended"), Duration::from_secs(300))
            .await
            .unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store.get_and_consume(tenant, b"contended").await.unwrap()
                })
            })
            .collect();
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_user_upsert_keeps_created_at() {
        let store = MemoryUserStore::new();
        let tenant = Uuid::new_v4();
        let first = WebauthnUser {
            tenant_id: tenant,
            user_id: "alice".into(),
            username: "alice".into(),
            display_name: None,
            icon: None,
            created_at: Utc::now() - chrono::Duration::days(1),
        };
        store.upsert(first.clone()).await.unwrap();

        let refreshed = store
            .upsert(WebauthnUser {
                username: "alice@example.com".into(),
                display_name: Some("Alice".into()),
                created_at: Utc::now(),
                ..first.clone()
            })
            .await
            .unwrap();
        assert_eq!(refreshed.created_at, first.created_at);
        assert_eq!(refreshed.username, "alice@example.com");
        assert_eq!(
            store.get(tenant, "alice").await.unwrap().unwrap().display_name.as_deref(),
            Some("Alice")
        );
    }
}

//! Ceremonies driven through the public API with pluggable collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use passkeyd_core::audit::RecordingAuditSink;
use passkeyd_core::testing::SoftAuthenticator;
use passkeyd_core::{
    AuditOperation, AuditOutcome, CeremonyError, Credential, CounterUpdate, CredentialId,
    CredentialStore, RegistrationRequest, RelyingParty, StaticTenantProvider, StoreError,
    TenantConfig, TenantConfigProvider, TenantId,
};
use uuid::Uuid;

fn tenant() -> TenantConfig {
    TenantConfig::new(
        Uuid::new_v4(),
        "login.example.org",
        "Example Org",
        vec!["https://login.example.org".into()],
    )
}

fn request(user_id: &str) -> RegistrationRequest {
    RegistrationRequest {
        user_id: user_id.into(),
        username: format!("{user_id}@example.org"),
        display_name: None,
        icon: None,
    }
}

async fn enroll(rp: &RelyingParty, tenant_id: TenantId, auth: &mut SoftAuthenticator, user: &str) {
    let challenge = rp.start_registration(tenant_id, request(user)).await.unwrap();
    rp.finish_registration(tenant_id, &auth.register(&challenge.public_key))
        .await
        .unwrap();
}

async fn login(
    rp: &RelyingParty,
    tenant_id: TenantId,
    auth: &mut SoftAuthenticator,
    user: Option<&str>,
) -> passkeyd_core::Result<Credential> {
    let challenge = rp.start_authentication(tenant_id, user).await?;
    rp.finish_authentication(tenant_id, &auth.authenticate(&challenge.public_key))
        .await
}

/// Counts lookups so tests can see the provider is consulted per call.
struct CountingProvider {
    inner: StaticTenantProvider,
    lookups: AtomicUsize,
}

#[async_trait]
impl TenantConfigProvider for CountingProvider {
    async fn get(&self, tenant_id: TenantId) -> Result<TenantConfig, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.get(tenant_id).await
    }
}

/// A credential store whose backend is down.
struct UnavailableStore;

#[async_trait]
impl CredentialStore for UnavailableStore {
    async fn get(&self, _: TenantId, _: &CredentialId) -> Result<Option<Credential>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn create(&self, _: Credential) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn update(&self, _: Credential) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn rename(&self, _: TenantId, _: &CredentialId, _: &str) -> Result<Credential, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn advance_counter(
        &self,
        _: TenantId,
        _: &CredentialId,
        _: CounterUpdate,
    ) -> Result<Credential, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn delete(&self, _: TenantId, _: &CredentialId) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn list(&self, _: TenantId, _: &str) -> Result<Vec<Credential>, StoreError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_ed25519_round_trip_through_public_api() {
    let tenant = tenant();
    let tenant_id = tenant.id;
    let rp = RelyingParty::in_memory(Arc::new(StaticTenantProvider::new([tenant]).unwrap()));
    let mut auth = SoftAuthenticator::ed25519();

    enroll(&rp, tenant_id, &mut auth, "iris").await;
    let first = login(&rp, tenant_id, &mut auth, Some("iris")).await.unwrap();
    let second = login(&rp, tenant_id, &mut auth, None).await.unwrap();

    assert_eq!(first.sign_counter, 1);
    assert_eq!(second.sign_counter, 2);
    assert_eq!(second.id.as_bytes(), auth.credential_id());
}

#[tokio::test]
async fn test_counterless_authenticator_keeps_working() {
    let tenant = tenant();
    let tenant_id = tenant.id;
    let rp = RelyingParty::in_memory(Arc::new(StaticTenantProvider::new([tenant]).unwrap()));
    let mut auth = SoftAuthenticator::es256().counterless();

    enroll(&rp, tenant_id, &mut auth, "jack").await;
    for _ in 0..3 {
        let credential = login(&rp, tenant_id, &mut auth, Some("jack")).await.unwrap();
        assert_eq!(credential.sign_counter, 0);
    }
}

#[tokio::test]
async fn test_tenant_is_resolved_on_every_call() {
    let tenant = tenant();
    let tenant_id = tenant.id;
    let provider = Arc::new(CountingProvider {
        inner: StaticTenantProvider::new([tenant]).unwrap(),
        lookups: AtomicUsize::new(0),
    });
    let rp = RelyingParty::in_memory(provider.clone());
    let mut auth = SoftAuthenticator::es256();

    enroll(&rp, tenant_id, &mut auth, "kate").await;
    login(&rp, tenant_id, &mut auth, Some("kate")).await.unwrap();

    assert_eq!(provider.lookups.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_store_outage_surfaces_as_unavailable() {
    let tenant = tenant();
    let tenant_id = tenant.id;
    let audit = Arc::new(RecordingAuditSink::new());
    let rp = RelyingParty::builder(Arc::new(StaticTenantProvider::new([tenant]).unwrap()))
        .credentials(Arc::new(UnavailableStore))
        .audit(audit.clone())
        .build();
    let mut auth = SoftAuthenticator::es256();

    let challenge = rp.start_registration(tenant_id, request("liam")).await.unwrap();
    let err = rp
        .finish_registration(tenant_id, &auth.register(&challenge.public_key))
        .await
        .unwrap_err();

    assert!(matches!(err, CeremonyError::StoreUnavailable(_)));
    let last = audit.events().pop().unwrap();
    assert_eq!(last.operation, AuditOperation::RegistrationFinish);
    assert_eq!(last.outcome, AuditOutcome::Error);
}

#[tokio::test]
async fn test_tenant_json_document_drives_policy() {
    let tenant_id = Uuid::new_v4();
    let document = format!(
        r#"[{{
            "id": "{tenant_id}",
            "rp_id": "login.example.org",
            "rp_name": "Example Org",
            "allowed_origins": ["https://login.example.org"],
            "user_verification": "required",
            "timeout_ms": 120000
        }}]"#
    );
    let rp = RelyingParty::in_memory(Arc::new(StaticTenantProvider::from_json(&document).unwrap()));
    let mut auth = SoftAuthenticator::es256().without_user_verification();

    let challenge = rp.start_registration(tenant_id, request("mia")).await.unwrap();
    assert_eq!(challenge.public_key.timeout, Some(120_000));

    let err = rp
        .finish_registration(tenant_id, &auth.register(&challenge.public_key))
        .await
        .unwrap_err();
    assert!(matches!(err, CeremonyError::VerificationFailed(_)));
}

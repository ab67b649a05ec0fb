//! passkeyd Core - multi-tenant WebAuthn ceremony engine
//!
//! This crate implements the relying-party side of WebAuthn Level 2 for many
//! isolated tenants sharing one deployment.
//!
//! # Features
//!
//! - Registration and authentication ceremonies with single-use challenges
//! - Attestation formats `none`, `packed` (self and basic) and `fido-u2f`
//! - ES256, EdDSA and RS256 credential keys
//! - Signature-counter clone detection with conditional counter writes
//! - Narrow store, tenant, entropy and audit contracts with in-memory engines
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use passkeyd_core::{RegistrationRequest, RelyingParty, StaticTenantProvider, TenantConfig};
//! use uuid::Uuid;
//!
//! # async fn example(response: passkeyd_core::wire::RegistrationResponse) -> passkeyd_core::Result<()> {
//! let tenant = TenantConfig::new(
//!     Uuid::new_v4(),
//!     "example.com",
//!     "Example",
//!     vec!["https://example.com".into()],
//! );
//! let tenant_id = tenant.id;
//! let tenants = StaticTenantProvider::new([tenant]).expect("valid tenant");
//! let rp = RelyingParty::in_memory(Arc::new(tenants));
//!
//! // Hand `challenge.public_key` to navigator.credentials.create()
//! let challenge = rp
//!     .start_registration(
//!         tenant_id,
//!         RegistrationRequest {
//!             user_id: "alice".into(),
//!             username: "alice@example.com".into(),
//!             display_name: None,
//!             icon: None,
//!         },
//!     )
//!     .await?;
//!
//! // ...and verify what the browser sends back
//! let credential = rp.finish_registration(tenant_id, &response).await?;
//! println!("enrolled {}", credential.id);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod ceremony;
pub mod crypto;
pub mod entropy;
pub mod error;
pub mod model;
pub mod store;
pub mod tenant;
pub mod wire;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types for convenience
pub use audit::{AuditEvent, AuditOperation, AuditOutcome, AuditSink, TracingAuditSink};
pub use ceremony::{RegistrationRequest, RelyingParty, RelyingPartyBuilder, DEFAULT_CHALLENGE_TTL};
pub use crypto::{CoseAlgorithm, CryptoError};
pub use entropy::{EntropySource, MockEntropy, OsEntropy};
pub use error::{CeremonyError, Result, MAX_NAME_LEN, MIN_CHALLENGE_LEN};
pub use model::{
    AttestationType, AuthenticatorTransport, CeremonyKind, ChallengeSession, CounterUpdate,
    Credential, CredentialId, TenantId, WebauthnUser,
};
pub use store::{
    ChallengeSessionStore, CredentialStore, MemoryChallengeStore, MemoryCredentialStore,
    MemoryUserStore, StoreError, UserStore,
};
pub use tenant::{
    StaticTenantProvider, TenantConfig, TenantConfigError, TenantConfigProvider,
    UserVerificationRequirement,
};

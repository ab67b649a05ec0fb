//! Example demonstrating ceremony and audit tracing output.
//!
//! Run with: cargo run -p passkeyd-core --features testing --example ceremony_tracing

use std::sync::Arc;

use passkeyd_core::testing::{SoftAttestation, SoftAuthenticator};
use passkeyd_core::{RegistrationRequest, RelyingParty, StaticTenantProvider, TenantConfig};
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber with debug level
    fmt()
        .with_env_filter(EnvFilter::new("passkeyd_core=debug,audit=info,info"))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    println!("=== passkeyd Ceremony Tracing Demo ===\n");

    let tenant = TenantConfig::new(
        Uuid::new_v4(),
        "example.com",
        "Example",
        vec!["https://example.com".into()],
    );
    let tenant_id = tenant.id;
    let tenants = match StaticTenantProvider::new([tenant]) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Invalid tenant: {}", e);
            return;
        }
    };
    let rp = RelyingParty::in_memory(Arc::new(tenants));
    let mut authenticator = SoftAuthenticator::es256().with_attestation(SoftAttestation::PackedSelf);

    println!("Registering...\n");
    let request = RegistrationRequest {
        user_id: "alice".into(),
        username: "alice@example.com".into(),
        display_name: Some("Alice".into()),
        icon: None,
    };
    let credential = match rp.start_registration(tenant_id, request).await {
        Ok(challenge) => {
            let response = authenticator.register(&challenge.public_key);
            rp.finish_registration(tenant_id, &response).await
        }
        Err(e) => Err(e),
    };
    match &credential {
        Ok(c) => println!("\n✅ Enrolled {} ({})\n", c.id, c.algorithm.name()),
        Err(e) => {
            println!("\n❌ Registration failed: {}", e);
            return;
        }
    }

    println!("Authenticating twice, then replaying an old counter...\n");
    for round in 0..3 {
        if round == 2 {
            authenticator.set_counter(1);
        }
        let result = match rp.start_authentication(tenant_id, Some("alice")).await {
            Ok(challenge) => {
                let response = authenticator.authenticate(&challenge.public_key);
                rp.finish_authentication(tenant_id, &response).await
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(c) => println!("\n✅ Login ok, counter {}\n", c.sign_counter),
            Err(e) => println!("\n❌ Login rejected: {}\n", e),
        }
    }
}

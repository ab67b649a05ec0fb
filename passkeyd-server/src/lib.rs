//! passkeyd Server Library - REST API around the passkeyd ceremony engine
//!
//! This library exposes the server components for use in integration tests.
//! The main binary uses these same components.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use passkeyd_core::{ChallengeSessionStore, RelyingParty, StoreError, TenantConfigProvider};
use tokio::task::JoinHandle;

pub use config::{Config, ConfigError};
pub use error::ApiError;
pub use openapi::ApiDoc;
pub use routes::{create_router, create_router_with_config};
pub use state::AppState;
pub use storage::PostgresStore;

/// Assemble the relying party and its stores from configuration.
///
/// Credentials and users go to PostgreSQL when `database_url` is set (after
/// running migrations); challenge sessions are always held in memory.
pub async fn build_state(
    config: &Config,
    tenants: Arc<dyn TenantConfigProvider>,
) -> Result<AppState, StoreError> {
    let builder = RelyingParty::builder(tenants).challenge_ttl(config.challenge_ttl());

    match &config.database_url {
        Some(url) => {
            let store = Arc::new(PostgresStore::connect(url, config.database_max_connections).await?);
            store.migrate().await?;
            let rp = builder.credentials(store.clone()).users(store.clone()).build();
            Ok(AppState::with_database(rp, store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set: credentials are kept in memory");
            Ok(AppState::in_memory(builder.build()))
        }
    }
}

/// Periodically drop expired challenge sessions.
pub fn spawn_challenge_sweeper(
    sessions: Arc<dyn ChallengeSessionStore>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match sessions.sweep_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Expired challenge sessions swept"),
                Err(e) => tracing::error!(error = %e, "Challenge sweep failed"),
            }
        }
    })
}

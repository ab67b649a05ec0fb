//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use std::sync::Arc;

use passkeyd_core::RelyingParty;

use crate::storage::PostgresStore;

/// Application state containing shared resources.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Ceremony engine serving every tenant
    pub rp: RelyingParty,
    /// Set when credentials are persisted in PostgreSQL
    pub database: Option<Arc<PostgresStore>>,
}

impl AppState {
    /// State backed entirely by in-memory stores
    pub fn in_memory(rp: RelyingParty) -> Self {
        Self { rp, database: None }
    }

    pub fn with_database(rp: RelyingParty, database: Arc<PostgresStore>) -> Self {
        Self {
            rp,
            database: Some(database),
        }
    }

    pub fn storage_backend(&self) -> &'static str {
        if self.database.is_some() {
            "postgres"
        } else {
            "memory"
        }
    }
}

//! Server configuration module
//!
//! Handles loading configuration from environment variables with sensible defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use passkeyd_core::{StaticTenantProvider, TenantConfigError};
use thiserror::Error;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3000)
    pub port: u16,
    /// Server host (default: 127.0.0.1)
    pub host: [u8; 4],
    /// Allowed CORS origins, comma-separated (default: allow all in dev)
    pub allowed_origins: Option<Vec<String>>,
    /// Request body limit in KB (default: 64)
    pub body_limit_kb: usize,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// Enable rate limiting (default: false for tests, true when loaded from env)
    pub rate_limit_enabled: bool,
    /// Rate limit: requests per second (default: 10)
    pub rate_limit_per_sec: u64,
    /// Rate limit: burst size (default: 20)
    pub rate_limit_burst: u32,
    /// Challenge session lifetime in seconds (default: 300)
    pub challenge_ttl_secs: u64,
    /// Interval between expired-session sweeps in seconds (default: 60)
    pub challenge_sweep_secs: u64,
    /// PostgreSQL URL; credentials stay in memory when unset
    pub database_url: Option<String>,
    /// Database connection pool maximum connections (default: 10)
    pub database_max_connections: u32,
    /// JSON file holding the tenant table
    pub tenants_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            host: [127, 0, 0, 1],
            allowed_origins: None, // None = allow all (dev mode)
            body_limit_kb: 64,
            timeout_secs: 30,
            rate_limit_enabled: false, // Disabled by default (for tests)
            rate_limit_per_sec: 10,
            rate_limit_burst: 20,
            challenge_ttl_secs: 300,
            challenge_sweep_secs: 60,
            database_url: None,
            database_max_connections: 10,
            tenants_file: None,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TENANTS_FILE is not set")]
    MissingTenantsFile,

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Tenants(#[from] TenantConfigError),

    #[error("No tenants configured")]
    NoTenants,

    #[error("Rate limit values must be positive when rate limiting is enabled")]
    InvalidRateLimit,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let host = std::env::var("HOST")
            .ok()
            .map(|h| {
                if h == "0.0.0.0" {
                    [0, 0, 0, 0]
                } else {
                    [127, 0, 0, 1]
                }
            })
            .unwrap_or([127, 0, 0, 1]);

        let allowed_origins = std::env::var("ALLOWED_ORIGINS").ok().map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        // Rate limiting enabled by default in production, can be disabled with RATE_LIMIT_ENABLED=false
        let rate_limit_enabled = std::env::var("RATE_LIMIT_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        Self {
            port: env_or("PORT", 3000),
            host,
            allowed_origins,
            body_limit_kb: env_or("BODY_LIMIT_KB", 64),
            timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30),
            rate_limit_enabled,
            rate_limit_per_sec: env_or("RATE_LIMIT_PER_SEC", 10),
            rate_limit_burst: env_or("RATE_LIMIT_BURST", 20),
            challenge_ttl_secs: env_or("CHALLENGE_TTL_SECS", 300),
            challenge_sweep_secs: env_or("CHALLENGE_SWEEP_SECS", 60),
            database_url,
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10),
            tenants_file: std::env::var("TENANTS_FILE").ok().map(PathBuf::from),
        }
    }

    /// Get socket address from config
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }

    pub fn challenge_ttl(&self) -> Duration {
        Duration::from_secs(self.challenge_ttl_secs.max(1))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.challenge_sweep_secs.max(1))
    }

    /// Reject settings the router cannot be built with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit_enabled && (self.rate_limit_per_sec == 0 || self.rate_limit_burst == 0) {
            return Err(ConfigError::InvalidRateLimit);
        }
        Ok(())
    }

    /// Read and validate the tenant table named by `tenants_file`.
    pub fn load_tenants(&self) -> Result<StaticTenantProvider, ConfigError> {
        let path = self
            .tenants_file
            .as_ref()
            .ok_or(ConfigError::MissingTenantsFile)?;
        let document = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let tenants = StaticTenantProvider::from_json(&document)?;
        if tenants.is_empty() {
            return Err(ConfigError::NoTenants);
        }
        Ok(tenants)
    }
}

//! PostgreSQL storage for WebAuthn users and credentials

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use passkeyd_core::{
    AttestationType, CoseAlgorithm, Credential, CounterUpdate, CredentialId, CredentialStore,
    StoreError, TenantId, UserStore, WebauthnUser,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

const CREDENTIAL_COLUMNS: &str = "tenant_id, credential_id, user_id, public_key, algorithm, \
     sign_counter, transports, backup_eligible, backup_state, attestation_type, aaguid, name, \
     created_at, last_used_at";

fn unavailable(err: sqlx::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

/// PostgreSQL-backed credential and user storage
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect with a bounded pool
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(unavailable)?;

        tracing::info!(max_connections, "Connected to PostgreSQL database");
        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migration failed: {e}")))?;

        tracing::info!("Database migrations completed");
        Ok(())
    }

    /// Check database connection health
    pub async fn check_health(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn stored_counter(
        &self,
        tenant_id: TenantId,
        credential_id: &CredentialId,
    ) -> Result<Option<u32>, StoreError> {
        let counter: Option<i64> = sqlx::query_scalar(
            "SELECT sign_counter FROM webauthn_credentials WHERE tenant_id = $1 AND credential_id = $2",
        )
        .bind(tenant_id)
        .bind(credential_id.as_bytes())
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        counter.map(counter_from_db).transpose()
    }

    /// Explain why a conditional write touched no row.
    async fn write_miss(
        &self,
        tenant_id: TenantId,
        credential_id: &CredentialId,
        received: u32,
    ) -> StoreError {
        match self.stored_counter(tenant_id, credential_id).await {
            Ok(Some(stored)) => StoreError::CounterRegression { stored, received },
            Ok(None) => StoreError::NotFound(format!("credential {credential_id}")),
            Err(err) => err,
        }
    }
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStore")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

#[async_trait]
impl CredentialStore for PostgresStore {
    async fn get(
        &self,
        tenant_id: TenantId,
        credential_id: &CredentialId,
    ) -> Result<Option<Credential>, StoreError> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM webauthn_credentials \
             WHERE tenant_id = $1 AND credential_id = $2"
        ))
        .bind(tenant_id)
        .bind(credential_id.as_bytes())
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        row.map(CredentialRow::into_credential).transpose()
    }

    async fn create(&self, credential: Credential) -> Result<(), StoreError> {
        let transports: Vec<String> = credential
            .transports
            .iter()
            .map(|t| t.as_str().to_string())
            .collect();

        let result = sqlx::query(
            r#"
            INSERT INTO webauthn_credentials
                (tenant_id, credential_id, user_id, public_key, algorithm, sign_counter,
                 transports, backup_eligible, backup_state, attestation_type, aaguid, name,
                 created_at, last_used_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (tenant_id, credential_id) DO NOTHING
            "#,
        )
        .bind(credential.tenant_id)
        .bind(credential.id.as_bytes())
        .bind(&credential.user_id)
        .bind(&credential.public_key)
        .bind(credential.algorithm.id())
        .bind(i64::from(credential.sign_counter))
        .bind(&transports)
        .bind(credential.backup_eligible)
        .bind(credential.backup_state)
        .bind(credential.attestation_type.as_str())
        .bind(credential.aaguid)
        .bind(&credential.name)
        .bind(credential.created_at)
        .bind(credential.last_used_at)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("credential {}", credential.id)));
        }

        tracing::debug!(credential_id = %credential.id, "Credential stored in database");
        Ok(())
    }

    async fn update(&self, credential: Credential) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE webauthn_credentials
            SET name = $3, sign_counter = $4, backup_state = $5, last_used_at = $6
            WHERE tenant_id = $1 AND credential_id = $2 AND sign_counter <= $4
            "#,
        )
        .bind(credential.tenant_id)
        .bind(credential.id.as_bytes())
        .bind(&credential.name)
        .bind(i64::from(credential.sign_counter))
        .bind(credential.backup_state)
        .bind(credential.last_used_at)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        if result.rows_affected() == 0 {
            return Err(self
                .write_miss(credential.tenant_id, &credential.id, credential.sign_counter)
                .await);
        }
        Ok(())
    }

    async fn rename(
        &self,
        tenant_id: TenantId,
        credential_id: &CredentialId,
        name: &str,
    ) -> Result<Credential, StoreError> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "UPDATE webauthn_credentials SET name = $3 \
             WHERE tenant_id = $1 AND credential_id = $2 \
             RETURNING {CREDENTIAL_COLUMNS}"
        ))
        .bind(tenant_id)
        .bind(credential_id.as_bytes())
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        row.ok_or_else(|| StoreError::NotFound(format!("credential {credential_id}")))?
            .into_credential()
    }

    async fn advance_counter(
        &self,
        tenant_id: TenantId,
        credential_id: &CredentialId,
        update: CounterUpdate,
    ) -> Result<Credential, StoreError> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "UPDATE webauthn_credentials \
             SET sign_counter = $3, backup_state = $4, last_used_at = $5 \
             WHERE tenant_id = $1 AND credential_id = $2 \
               AND (sign_counter < $3 OR (sign_counter = 0 AND $3 = 0)) \
             RETURNING {CREDENTIAL_COLUMNS}"
        ))
        .bind(tenant_id)
        .bind(credential_id.as_bytes())
        .bind(i64::from(update.sign_counter))
        .bind(update.backup_state)
        .bind(update.used_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        match row {
            Some(row) => row.into_credential(),
            None => Err(self
                .write_miss(tenant_id, credential_id, update.sign_counter)
                .await),
        }
    }

    async fn delete(
        &self,
        tenant_id: TenantId,
        credential_id: &CredentialId,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM webauthn_credentials WHERE tenant_id = $1 AND credential_id = $2")
            .bind(tenant_id)
            .bind(credential_id.as_bytes())
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn list(&self, tenant_id: TenantId, user_id: &str) -> Result<Vec<Credential>, StoreError> {
        let rows = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM webauthn_credentials \
             WHERE tenant_id = $1 AND user_id = $2 \
             ORDER BY created_at ASC, seq ASC"
        ))
        .bind(tenant_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.into_iter().map(CredentialRow::into_credential).collect()
    }
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn get(
        &self,
        tenant_id: TenantId,
        user_id: &str,
    ) -> Result<Option<WebauthnUser>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT tenant_id, user_id, username, display_name, icon, created_at
            FROM webauthn_users
            WHERE tenant_id = $1 AND user_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(row.map(UserRow::into_user))
    }

    async fn upsert(&self, user: WebauthnUser) -> Result<WebauthnUser, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO webauthn_users (tenant_id, user_id, username, display_name, icon, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tenant_id, user_id) DO UPDATE SET
                username = EXCLUDED.username,
                display_name = EXCLUDED.display_name,
                icon = EXCLUDED.icon
            RETURNING tenant_id, user_id, username, display_name, icon, created_at
            "#,
        )
        .bind(user.tenant_id)
        .bind(&user.user_id)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(&user.icon)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(row.into_user())
    }
}

fn counter_from_db(value: i64) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("sign counter {value} out of range")))
}

/// Database row for credentials
#[derive(sqlx::FromRow)]
struct CredentialRow {
    tenant_id: Uuid,
    credential_id: Vec<u8>,
    user_id: String,
    public_key: Vec<u8>,
    algorithm: i64,
    sign_counter: i64,
    transports: Vec<String>,
    backup_eligible: bool,
    backup_state: bool,
    attestation_type: String,
    aaguid: Uuid,
    name: Option<String>,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
}

impl CredentialRow {
    fn into_credential(self) -> Result<Credential, StoreError> {
        let algorithm = CoseAlgorithm::from_id(self.algorithm).ok_or_else(|| {
            StoreError::Serialization(format!("unknown algorithm {}", self.algorithm))
        })?;
        let attestation_type: AttestationType = self
            .attestation_type
            .parse()
            .map_err(StoreError::Serialization)?;

        Ok(Credential {
            id: CredentialId::new(self.credential_id),
            tenant_id: self.tenant_id,
            user_id: self.user_id,
            public_key: self.public_key,
            algorithm,
            sign_counter: counter_from_db(self.sign_counter)?,
            transports: self
                .transports
                .iter()
                .filter_map(|t| t.parse().ok())
                .collect(),
            backup_eligible: self.backup_eligible,
            backup_state: self.backup_state,
            attestation_type,
            aaguid: self.aaguid,
            created_at: self.created_at,
            last_used_at: self.last_used_at,
            name: self.name,
        })
    }
}

/// Database row for users
#[derive(sqlx::FromRow)]
struct UserRow {
    tenant_id: Uuid,
    user_id: String,
    username: String,
    display_name: Option<String>,
    icon: Option<String>,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> WebauthnUser {
        WebauthnUser {
            tenant_id: self.tenant_id,
            user_id: self.user_id,
            username: self.username,
            display_name: self.display_name,
            icon: self.icon,
            created_at: self.created_at,
        }
    }
}

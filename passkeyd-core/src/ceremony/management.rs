//! Credential management for enrolled users.

use super::RelyingParty;
use crate::error::{CeremonyError, Result, MAX_NAME_LEN};
use crate::model::{Credential, CredentialId, TenantId};

impl RelyingParty {
    /// A user's credentials, oldest first.
    #[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn list_credentials(&self, tenant_id: TenantId, user_id: &str) -> Result<Vec<Credential>> {
        if user_id.trim().is_empty() {
            return Err(CeremonyError::invalid_input("user_id is required"));
        }
        self.tenant(tenant_id).await?;
        Ok(self.credentials.list(tenant_id, user_id).await?)
    }

    #[tracing::instrument(skip(self, name), fields(tenant_id = %tenant_id, credential_id = %credential_id))]
    pub async fn rename_credential(
        &self,
        tenant_id: TenantId,
        credential_id: &CredentialId,
        name: &str,
    ) -> Result<Credential> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(CeremonyError::invalid_input(format!(
                "name must be 1 to {MAX_NAME_LEN} characters"
            )));
        }
        self.tenant(tenant_id).await?;

        let credential = self
            .credentials
            .rename(tenant_id, credential_id, name)
            .await?;

        tracing::info!("Credential renamed");
        Ok(credential)
    }

    /// Remove a credential; deleting an unknown id succeeds.
    #[tracing::instrument(skip(self), fields(tenant_id = %tenant_id, credential_id = %credential_id))]
    pub async fn delete_credential(&self, tenant_id: TenantId, credential_id: &CredentialId) -> Result<()> {
        self.tenant(tenant_id).await?;
        self.credentials.delete(tenant_id, credential_id).await?;
        tracing::info!("Credential deleted");
        Ok(())
    }
}

//! Credential management handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use passkeyd_core::{CredentialId, TenantId};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use super::CredentialResponse;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::state::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListCredentialsQuery {
    /// Owner of the credentials
    pub user_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RenameCredentialRequest {
    #[schema(example = "Work laptop")]
    pub name: String,
}

fn parse_credential_id(encoded: &str) -> Result<CredentialId, ApiError> {
    CredentialId::from_base64url(encoded)
        .filter(|id| !id.as_bytes().is_empty())
        .ok_or_else(|| ApiError::bad_request("credential_id must be base64url"))
}

/// GET /{tenant_id}/credentials?user_id=...
///
/// Credentials of one user, oldest first.
#[utoipa::path(
    get,
    path = "/{tenant_id}/credentials",
    tag = "Credentials",
    params(("tenant_id" = uuid::Uuid, Path, description = "Tenant identifier"), ListCredentialsQuery),
    responses(
        (status = 200, description = "Credentials in enrollment order", body = Vec<CredentialResponse>),
        (status = 404, description = "Unknown tenant")
    )
)]
pub async fn list_credentials(
    State(state): State<AppState>,
    Path(tenant_id): Path<TenantId>,
    Query(query): Query<ListCredentialsQuery>,
) -> Result<Json<Vec<CredentialResponse>>, ApiError> {
    let credentials = state.rp.list_credentials(tenant_id, &query.user_id).await?;
    Ok(Json(credentials.into_iter().map(Into::into).collect()))
}

/// PATCH /{tenant_id}/credentials/{credential_id}
#[utoipa::path(
    patch,
    path = "/{tenant_id}/credentials/{credential_id}",
    tag = "Credentials",
    params(
        ("tenant_id" = uuid::Uuid, Path, description = "Tenant identifier"),
        ("credential_id" = String, Path, description = "Credential id, base64url")
    ),
    request_body = RenameCredentialRequest,
    responses(
        (status = 204, description = "Credential renamed"),
        (status = 400, description = "Invalid name"),
        (status = 404, description = "Unknown tenant or credential")
    )
)]
pub async fn rename_credential(
    State(state): State<AppState>,
    Path((tenant_id, credential_id)): Path<(TenantId, String)>,
    ApiJson(req): ApiJson<RenameCredentialRequest>,
) -> Result<StatusCode, ApiError> {
    let credential_id = parse_credential_id(&credential_id)?;
    state
        .rp
        .rename_credential(tenant_id, &credential_id, &req.name)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /{tenant_id}/credentials/{credential_id}
///
/// Idempotent: deleting an unknown credential also returns 204.
#[utoipa::path(
    delete,
    path = "/{tenant_id}/credentials/{credential_id}",
    tag = "Credentials",
    params(
        ("tenant_id" = uuid::Uuid, Path, description = "Tenant identifier"),
        ("credential_id" = String, Path, description = "Credential id, base64url")
    ),
    responses(
        (status = 204, description = "Credential deleted"),
        (status = 404, description = "Unknown tenant")
    )
)]
pub async fn delete_credential(
    State(state): State<AppState>,
    Path((tenant_id, credential_id)): Path<(TenantId, String)>,
) -> Result<StatusCode, ApiError> {
    let credential_id = parse_credential_id(&credential_id)?;
    state.rp.delete_credential(tenant_id, &credential_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_credential_id() {
        assert_eq!(parse_credential_id("AQID").unwrap().as_bytes(), &[1, 2, 3]);
        assert!(parse_credential_id("").is_err());
        assert!(parse_credential_id("not base64!").is_err());
    }
}

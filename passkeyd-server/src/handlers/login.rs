//! Authentication ceremony handlers

use axum::{
    extract::{Path, State},
    Json,
};
use passkeyd_core::wire::{AuthenticationChallenge, AuthenticationResponse};
use passkeyd_core::TenantId;
use serde::Deserialize;
use utoipa::ToSchema;

use super::CredentialResponse;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::state::AppState;

/// Request to begin a login
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct LoginInitRequest {
    /// Omit for discoverable (usernameless) login
    #[serde(default)]
    #[schema(example = "user-4711")]
    pub user_id: Option<String>,
}

/// POST /{tenant_id}/login/initialize
#[utoipa::path(
    post,
    path = "/{tenant_id}/login/initialize",
    tag = "Authentication",
    params(("tenant_id" = uuid::Uuid, Path, description = "Tenant identifier")),
    request_body = LoginInitRequest,
    responses(
        (status = 200, description = "Request options issued (JSON with sessionId and publicKey)"),
        (status = 404, description = "Unknown tenant, user or no credentials")
    )
)]
pub async fn login_initialize(
    State(state): State<AppState>,
    Path(tenant_id): Path<TenantId>,
    ApiJson(req): ApiJson<LoginInitRequest>,
) -> Result<Json<AuthenticationChallenge>, ApiError> {
    let challenge = state
        .rp
        .start_authentication(tenant_id, req.user_id.as_deref())
        .await?;
    Ok(Json(challenge))
}

/// POST /{tenant_id}/login/finalize
///
/// Request body is the `PublicKeyCredential` returned by `navigator.credentials.get()`.
#[utoipa::path(
    post,
    path = "/{tenant_id}/login/finalize",
    tag = "Authentication",
    params(("tenant_id" = uuid::Uuid, Path, description = "Tenant identifier")),
    request_body(content_type = "application/json", description = "WebAuthn assertion response from browser"),
    responses(
        (status = 200, description = "Assertion verified", body = CredentialResponse),
        (status = 400, description = "Malformed response or expired challenge"),
        (status = 401, description = "Unknown credential or verification failed"),
        (status = 403, description = "Signature counter did not advance")
    )
)]
pub async fn login_finalize(
    State(state): State<AppState>,
    Path(tenant_id): Path<TenantId>,
    ApiJson(response): ApiJson<AuthenticationResponse>,
) -> Result<Json<CredentialResponse>, ApiError> {
    let credential = state.rp.finish_authentication(tenant_id, &response).await?;
    Ok(Json(credential.into()))
}

//! Registration ceremony handlers

use axum::{
    extract::{Path, State},
    Json,
};
use passkeyd_core::wire::{RegistrationChallenge, RegistrationResponse};
use passkeyd_core::{RegistrationRequest, TenantId};
use serde::Deserialize;
use utoipa::ToSchema;

use super::CredentialResponse;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::state::AppState;

/// Request to begin enrolling a passkey
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegistrationInitRequest {
    /// Stable application identifier of the user
    #[schema(example = "user-4711")]
    pub user_id: String,
    #[schema(example = "alice@example.com")]
    pub username: String,
    #[serde(default)]
    #[schema(example = "Alice")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

impl From<RegistrationInitRequest> for RegistrationRequest {
    fn from(req: RegistrationInitRequest) -> Self {
        Self {
            user_id: req.user_id,
            username: req.username,
            display_name: req.display_name,
            icon: req.icon,
        }
    }
}

/// POST /{tenant_id}/registration/initialize
///
/// Returns `{sessionId, publicKey}` where `publicKey` is handed to
/// `navigator.credentials.create()`.
#[utoipa::path(
    post,
    path = "/{tenant_id}/registration/initialize",
    tag = "Registration",
    params(("tenant_id" = uuid::Uuid, Path, description = "Tenant identifier")),
    request_body = RegistrationInitRequest,
    responses(
        (status = 200, description = "Creation options issued (JSON with sessionId and publicKey)"),
        (status = 400, description = "Invalid user fields"),
        (status = 404, description = "Unknown tenant")
    )
)]
pub async fn registration_initialize(
    State(state): State<AppState>,
    Path(tenant_id): Path<TenantId>,
    ApiJson(req): ApiJson<RegistrationInitRequest>,
) -> Result<Json<RegistrationChallenge>, ApiError> {
    let challenge = state.rp.start_registration(tenant_id, req.into()).await?;
    Ok(Json(challenge))
}

/// POST /{tenant_id}/registration/finalize
///
/// Request body is the `PublicKeyCredential` returned by the browser.
#[utoipa::path(
    post,
    path = "/{tenant_id}/registration/finalize",
    tag = "Registration",
    params(("tenant_id" = uuid::Uuid, Path, description = "Tenant identifier")),
    request_body(content_type = "application/json", description = "WebAuthn registration response from browser"),
    responses(
        (status = 200, description = "Credential enrolled", body = CredentialResponse),
        (status = 400, description = "Malformed response or expired challenge"),
        (status = 401, description = "Attestation verification failed"),
        (status = 409, description = "Credential already enrolled")
    )
)]
pub async fn registration_finalize(
    State(state): State<AppState>,
    Path(tenant_id): Path<TenantId>,
    ApiJson(response): ApiJson<RegistrationResponse>,
) -> Result<Json<CredentialResponse>, ApiError> {
    let credential = state.rp.finish_registration(tenant_id, &response).await?;
    Ok(Json(credential.into()))
}

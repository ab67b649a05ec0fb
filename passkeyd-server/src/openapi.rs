//! OpenAPI documentation configuration
//!
//! Generates the OpenAPI 3 document served at `/openapi.json`.

use utoipa::OpenApi;

use crate::handlers::{
    CredentialResponse, HealthResponse, LoginInitRequest, ReadyResponse, RegistrationInitRequest,
    RenameCredentialRequest,
};

/// passkeyd API - OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "passkeyd - WebAuthn Relying Party API",
        version = "0.1.0",
        description = r#"
## Multi-tenant passkey registration and login

Every ceremony endpoint is scoped by a tenant id. A tenant carries its own
relying party id, allowed origins and user verification policy.

### How It Works

1. `POST /{tenant_id}/registration/initialize` issues creation options
2. The browser calls `navigator.credentials.create()` with `publicKey`
3. `POST /{tenant_id}/registration/finalize` verifies the attestation and enrolls the credential
4. Login follows the same pattern under `/{tenant_id}/login/*`

Challenges are single use and expire after a configurable lifetime.
"#,
        license(name = "MIT OR Apache-2.0")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    tags(
        (name = "Registration", description = "Enroll new passkeys"),
        (name = "Authentication", description = "Verify passkey assertions"),
        (name = "Credentials", description = "List, rename and delete enrolled passkeys"),
        (name = "Health", description = "Service health and readiness endpoints")
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::health::ready,
        crate::handlers::registration::registration_initialize,
        crate::handlers::registration::registration_finalize,
        crate::handlers::login::login_initialize,
        crate::handlers::login::login_finalize,
        crate::handlers::credentials::list_credentials,
        crate::handlers::credentials::rename_credential,
        crate::handlers::credentials::delete_credential,
    ),
    components(
        schemas(
            HealthResponse,
            ReadyResponse,
            RegistrationInitRequest,
            LoginInitRequest,
            RenameCredentialRequest,
            CredentialResponse,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_tenant_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| p.as_str() == "/{tenant_id}/login/finalize"));
        assert!(paths
            .iter()
            .any(|p| p.as_str() == "/{tenant_id}/credentials/{credential_id}"));
    }
}

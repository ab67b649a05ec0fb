//! API error handling module
//!
//! Maps ceremony errors onto HTTP statuses and stable error codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use passkeyd_core::CeremonyError;
use thiserror::Error;

/// API error type with structured variants for different error categories
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request - client provided invalid input outside a ceremony
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request body could not be extracted
    #[error("Rejected request body: {message}")]
    Rejected { status: StatusCode, message: String },

    /// Service unavailable - a dependency is down
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Error raised by the ceremony engine
    #[error(transparent)]
    Ceremony(#[from] CeremonyError),
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Create a service unavailable error
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Rejected { status, .. } => *status,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Ceremony(e) => match e {
                CeremonyError::InvalidInput(_) | CeremonyError::ChallengeExpired => {
                    StatusCode::BAD_REQUEST
                }
                CeremonyError::NotFound(_) => StatusCode::NOT_FOUND,
                CeremonyError::UnknownCredential(_) | CeremonyError::VerificationFailed(_) => {
                    StatusCode::UNAUTHORIZED
                }
                CeremonyError::CloneDetected { .. } => StatusCode::FORBIDDEN,
                CeremonyError::Conflict(_) => StatusCode::CONFLICT,
                CeremonyError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                CeremonyError::Entropy(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Get the error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) | Self::Rejected { .. } => "INVALID_INPUT",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Ceremony(e) => match e {
                CeremonyError::InvalidInput(_) => "INVALID_INPUT",
                CeremonyError::NotFound(_) => "NOT_FOUND",
                CeremonyError::UnknownCredential(_) => "UNKNOWN_CREDENTIAL",
                CeremonyError::ChallengeExpired => "CHALLENGE_EXPIRED",
                CeremonyError::VerificationFailed(_) => "VERIFICATION_FAILED",
                CeremonyError::CloneDetected { .. } => "CLONE_DETECTED",
                CeremonyError::Conflict(_) => "CONFLICT",
                CeremonyError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
                CeremonyError::Entropy(_) => "INTERNAL_ERROR",
            },
        }
    }

    /// Get sanitized error message for client response
    fn client_message(&self) -> String {
        match self {
            Self::Ceremony(e) => match e {
                CeremonyError::VerificationFailed(_) => "WebAuthn verification failed".to_string(),
                CeremonyError::UnknownCredential(_) => "Unknown credential".to_string(),
                CeremonyError::CloneDetected { .. } => {
                    "Authenticator signature counter did not advance".to_string()
                }
                CeremonyError::StoreUnavailable(_) => "Credential store unavailable".to_string(),
                CeremonyError::Entropy(_) => "Internal server error".to_string(),
                _ => e.to_string(),
            },
            // For other errors, use the Display message
            _ => self.to_string(),
        }
    }

    /// Get the error category for logging
    fn error_category(&self) -> &'static str {
        match self {
            Self::BadRequest(_) | Self::Rejected { .. } => "bad_request",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Ceremony(e) => match e {
                CeremonyError::InvalidInput(_)
                | CeremonyError::NotFound(_)
                | CeremonyError::ChallengeExpired
                | CeremonyError::Conflict(_) => "client",
                CeremonyError::UnknownCredential(_)
                | CeremonyError::VerificationFailed(_)
                | CeremonyError::CloneDetected { .. } => "verification",
                CeremonyError::StoreUnavailable(_) | CeremonyError::Entropy(_) => "server",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let category = self.error_category();
        let code = self.error_code();
        let internal_message = self.to_string();
        let client_message = self.client_message();

        // Log based on severity, always including internal details
        if status.is_server_error() {
            tracing::error!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Server error"
            );
        } else {
            tracing::warn!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Client error"
            );
        }

        // All error responses include a `code` field for programmatic error handling
        let body = serde_json::json!({
            "error": client_message,
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}

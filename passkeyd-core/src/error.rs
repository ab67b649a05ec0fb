use thiserror::Error;

use crate::crypto::CryptoError;
use crate::store::StoreError;

/// Minimum challenge length accepted from an entropy source.
pub const MIN_CHALLENGE_LEN: usize = 16;

/// Maximum length of usernames, display names and credential names.
pub const MAX_NAME_LEN: usize = 128;

#[derive(Error, Debug)]
pub enum CeremonyError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown credential: {0}")]
    UnknownCredential(String),

    #[error("Challenge expired or already used")]
    ChallengeExpired,

    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("Clone detected: stored counter {stored}, received {received}")]
    CloneDetected { stored: u32, received: u32 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Entropy source failure: {0}")]
    Entropy(String),
}

impl CeremonyError {
    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub(crate) fn verification(message: impl Into<String>) -> Self {
        Self::VerificationFailed(message.into())
    }
}

impl From<CryptoError> for CeremonyError {
    fn from(err: CryptoError) -> Self {
        Self::VerificationFailed(err.to_string())
    }
}

impl From<StoreError> for CeremonyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Conflict(what) => Self::Conflict(what),
            StoreError::CounterRegression { stored, received } => {
                Self::CloneDetected { stored, received }
            }
            StoreError::Unavailable(reason) | StoreError::Serialization(reason) => {
                Self::StoreUnavailable(reason)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, CeremonyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_regression_maps_to_clone_detected() {
        let err: CeremonyError = StoreError::CounterRegression {
            stored: 9,
            received: 4,
        }
        .into();
        assert!(matches!(
            err,
            CeremonyError::CloneDetected {
                stored: 9,
                received: 4
            }
        ));
    }

    #[test]
    fn test_crypto_errors_surface_as_verification_failures() {
        let err: CeremonyError = CryptoError::InvalidSignature.into();
        assert!(matches!(err, CeremonyError::VerificationFailed(_)));
    }

    #[test]
    fn test_serialization_failures_are_store_unavailable() {
        let err: CeremonyError = StoreError::Serialization("bad row".into()).into();
        assert!(matches!(err, CeremonyError::StoreUnavailable(_)));
    }
}

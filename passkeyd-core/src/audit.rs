//! Ceremony audit events.
//!
//! Recording is fire-and-forget: a sink cannot fail a ceremony.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::CeremonyError;
use crate::model::TenantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    RegistrationInit,
    RegistrationFinish,
    AuthenticationInit,
    AuthenticationFinish,
}

impl AuditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegistrationInit => "registration_init",
            Self::RegistrationFinish => "registration_finish",
            Self::AuthenticationInit => "authentication_init",
            Self::AuthenticationFinish => "authentication_finish",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    VerificationFailed,
    CloneDetected,
    Expired,
    Error,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::VerificationFailed => "verification_failed",
            Self::CloneDetected => "clone_detected",
            Self::Expired => "expired",
            Self::Error => "error",
        }
    }
}

impl From<&CeremonyError> for AuditOutcome {
    fn from(err: &CeremonyError) -> Self {
        match err {
            CeremonyError::ChallengeExpired => Self::Expired,
            CeremonyError::VerificationFailed(_) | CeremonyError::UnknownCredential(_) => {
                Self::VerificationFailed
            }
            CeremonyError::CloneDetected { .. } => Self::CloneDetected,
            _ => Self::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub tenant_id: TenantId,
    /// User id when known
    pub actor: Option<String>,
    pub operation: AuditOperation,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Emits audit events as `tracing` records on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
        match event.outcome {
            AuditOutcome::Success => tracing::info!(
                target: "audit",
                tenant_id = %event.tenant_id,
                actor = event.actor.as_deref().unwrap_or("-"),
                operation = event.operation.as_str(),
                outcome = event.outcome.as_str(),
                metadata = %metadata,
                "ceremony"
            ),
            _ => tracing::warn!(
                target: "audit",
                tenant_id = %event.tenant_id,
                actor = event.actor.as_deref().unwrap_or("-"),
                operation = event.operation.as_str(),
                outcome = event.outcome.as_str(),
                metadata = %metadata,
                "ceremony"
            ),
        }
    }
}

/// Collects ceremony context and emits exactly one event.
pub(crate) struct AuditTrail {
    tenant_id: TenantId,
    operation: AuditOperation,
    actor: Option<String>,
    metadata: BTreeMap<String, String>,
}

impl AuditTrail {
    pub(crate) fn new(tenant_id: TenantId, operation: AuditOperation) -> Self {
        Self {
            tenant_id,
            operation,
            actor: None,
            metadata: BTreeMap::new(),
        }
    }

    pub(crate) fn actor(&mut self, user_id: impl Into<String>) {
        self.actor = Some(user_id.into());
    }

    pub(crate) fn note(&mut self, key: &str, value: impl ToString) {
        self.metadata.insert(key.to_string(), value.to_string());
    }

    /// Record the outcome of `result` and hand it back unchanged.
    pub(crate) fn finish<T>(
        mut self,
        sink: &dyn AuditSink,
        result: Result<T, CeremonyError>,
    ) -> Result<T, CeremonyError> {
        let outcome = match &result {
            Ok(_) => AuditOutcome::Success,
            Err(err) => {
                self.note("reason", err);
                AuditOutcome::from(err)
            }
        };
        sink.record(AuditEvent {
            tenant_id: self.tenant_id,
            actor: self.actor,
            operation: self.operation,
            outcome,
            metadata: self.metadata,
        });
        result
    }
}

/// In-memory sink for assertions in tests.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    events: std::sync::Mutex<Vec<AuditEvent>>,
}

#[cfg(any(test, feature = "testing"))]
impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[cfg(any(test, feature = "testing"))]
impl AuditSink for RecordingAuditSink {
    fn record(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_outcome_mapping() {
        assert_eq!(
            AuditOutcome::from(&CeremonyError::ChallengeExpired),
            AuditOutcome::Expired
        );
        assert_eq!(
            AuditOutcome::from(&CeremonyError::UnknownCredential("x".into())),
            AuditOutcome::VerificationFailed
        );
        assert_eq!(
            AuditOutcome::from(&CeremonyError::CloneDetected {
                stored: 2,
                received: 1
            }),
            AuditOutcome::CloneDetected
        );
        assert_eq!(
            AuditOutcome::from(&CeremonyError::StoreUnavailable("db".into())),
            AuditOutcome::Error
        );
    }

    #[test]
    fn test_trail_records_reason_on_failure() {
        let sink = RecordingAuditSink::new();
        let mut trail = AuditTrail::new(Uuid::new_v4(), AuditOperation::AuthenticationFinish);
        trail.actor("alice");
        trail.note("session_id", "abc");
        let result: Result<(), _> = trail.finish(&sink, Err(CeremonyError::ChallengeExpired));
        assert!(result.is_err());

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, AuditOutcome::Expired);
        assert_eq!(events[0].actor.as_deref(), Some("alice"));
        assert_eq!(events[0].metadata["session_id"], "abc");
        assert!(events[0].metadata.contains_key("reason"));
    }
}

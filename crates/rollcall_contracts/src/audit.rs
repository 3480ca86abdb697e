#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use crate::roster::IdentityId;
use crate::session::SessionId;
use crate::{ContractViolation, MonotonicTimeNs, ReasonCodeId, SchemaVersion, Validate};

pub const AUDIT_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

const MAX_PAYLOAD_ENTRIES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CorrelationId(pub u128);

impl Validate for CorrelationId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "correlation_id",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TurnId(pub u64);

impl Validate for TurnId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "turn_id",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AuditEventId(pub u64);

impl Validate for AuditEventId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "audit_event_id",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

/// Pipeline area that produced the event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuditArea {
    Registry,
    Geofence,
    Identity,
    Dedup,
    Biometric,
    Verify,
    Export,
    Other(String),
}

impl Validate for AuditArea {
    fn validate(&self) -> Result<(), ContractViolation> {
        if let AuditArea::Other(name) = self {
            if name.trim().is_empty() {
                return Err(ContractViolation::InvalidValue {
                    field: "audit_area.other",
                    reason: "must not be empty",
                });
            }
            if name.len() > 64 {
                return Err(ContractViolation::InvalidValue {
                    field: "audit_area.other",
                    reason: "must be <= 64 chars",
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditEventType {
    SessionCreated,
    SubmissionAccepted,
    SubmissionRejected,
    ReferenceRegistered,
    DaySheetExported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditSeverity {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PayloadKey(String);

impl PayloadKey {
    pub fn new(key: impl Into<String>) -> Result<Self, ContractViolation> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "payload_key",
                reason: "must not be empty",
            });
        }
        if key.len() > 64 {
            return Err(ContractViolation::InvalidValue {
                field: "payload_key",
                reason: "must be <= 64 chars",
            });
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadValue(String);

impl PayloadValue {
    pub fn new(value: impl Into<String>) -> Result<Self, ContractViolation> {
        let value = value.into();
        if value.len() > 256 {
            return Err(ContractViolation::InvalidValue {
                field: "payload_value",
                reason: "must be <= 256 chars",
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditEventInput {
    pub schema_version: SchemaVersion,
    pub now: MonotonicTimeNs,
    pub correlation_id: CorrelationId,
    pub turn_id: TurnId,
    pub area: AuditArea,
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub reason_code: ReasonCodeId,
    pub session_id: Option<SessionId>,
    pub identity_id: Option<IdentityId>,
    pub payload: BTreeMap<PayloadKey, PayloadValue>,
}

impl AuditEventInput {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        now: MonotonicTimeNs,
        correlation_id: CorrelationId,
        turn_id: TurnId,
        area: AuditArea,
        event_type: AuditEventType,
        severity: AuditSeverity,
        reason_code: ReasonCodeId,
        session_id: Option<SessionId>,
        identity_id: Option<IdentityId>,
        payload: BTreeMap<PayloadKey, PayloadValue>,
    ) -> Result<Self, ContractViolation> {
        let input = Self {
            schema_version: AUDIT_CONTRACT_VERSION,
            now,
            correlation_id,
            turn_id,
            area,
            event_type,
            severity,
            reason_code,
            session_id,
            identity_id,
            payload,
        };
        input.validate()?;
        Ok(input)
    }
}

impl Validate for AuditEventInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != AUDIT_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "audit_event_input.schema_version",
                reason: "must match AUDIT_CONTRACT_VERSION",
            });
        }
        self.correlation_id.validate()?;
        self.turn_id.validate()?;
        self.area.validate()?;
        if self.reason_code.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "audit_event_input.reason_code",
                reason: "must be > 0",
            });
        }
        if let Some(sid) = &self.session_id {
            sid.validate()?;
        }
        if let Some(id) = &self.identity_id {
            id.validate()?;
        }
        if self.payload.len() > MAX_PAYLOAD_ENTRIES {
            return Err(ContractViolation::InvalidValue {
                field: "audit_event_input.payload",
                reason: "too many entries",
            });
        }
        Ok(())
    }
}

/// Ledger row: the input plus its assigned append-only id.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub audit_event_id: AuditEventId,
    pub input: AuditEventInput,
}

impl Validate for AuditEvent {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.audit_event_id.validate()?;
        self.input.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_requires_nonzero_ids_and_reason_code() {
        let input = AuditEventInput::v1(
            MonotonicTimeNs(1),
            CorrelationId(0),
            TurnId(1),
            AuditArea::Verify,
            AuditEventType::SubmissionAccepted,
            AuditSeverity::Info,
            ReasonCodeId(1),
            None,
            None,
            BTreeMap::new(),
        );
        assert!(input.is_err());
    }

    #[test]
    fn payload_entry_cap_is_enforced() {
        let mut payload = BTreeMap::new();
        for i in 0..=MAX_PAYLOAD_ENTRIES {
            payload.insert(
                PayloadKey::new(format!("k{i}")).unwrap(),
                PayloadValue::new("v").unwrap(),
            );
        }
        let input = AuditEventInput::v1(
            MonotonicTimeNs(1),
            CorrelationId(1),
            TurnId(1),
            AuditArea::Verify,
            AuditEventType::SubmissionRejected,
            AuditSeverity::Warn,
            ReasonCodeId(1),
            None,
            None,
            payload,
        );
        assert!(input.is_err());
    }
}

#![forbid(unsafe_code)]

use crate::geo::{GeoPoint, RadiusM};
use crate::{ContractViolation, MonotonicTimeNs, SchemaVersion, Validate};

pub const SESSION_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Opaque session token. Minted once at upload time, immutable after.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = id.into();
        let v = Self(id);
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for SessionId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_id("session_id", &self.0, 64)
    }
}

/// Key of the roster table a session reads and marks. The engine never owns
/// the table, only reaches it through the accessor contract.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RosterRef(String);

impl RosterRef {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = id.into();
        let v = Self(id);
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for RosterRef {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_id("roster_ref", &self.0, 96)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BiometricPolicy {
    Disabled,
    Required,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub schema_version: SchemaVersion,
    pub session_id: SessionId,
    pub center: GeoPoint,
    pub radius_m: RadiusM,
    pub roster_ref: RosterRef,
    pub biometric_policy: BiometricPolicy,
    pub created_at: MonotonicTimeNs,
}

impl SessionRecord {
    pub fn v1(
        session_id: SessionId,
        center: GeoPoint,
        radius_m: RadiusM,
        roster_ref: RosterRef,
        biometric_policy: BiometricPolicy,
        created_at: MonotonicTimeNs,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: SESSION_CONTRACT_VERSION,
            session_id,
            center,
            radius_m,
            roster_ref,
            biometric_policy,
            created_at,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for SessionRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != SESSION_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "session_record.schema_version",
                reason: "must match SESSION_CONTRACT_VERSION",
            });
        }
        self.session_id.validate()?;
        self.center.validate()?;
        self.radius_m.validate()?;
        self.roster_ref.validate()?;
        Ok(())
    }
}

fn validate_id(field: &'static str, s: &str, max_len: usize) -> Result<(), ContractViolation> {
    if s.trim().is_empty() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not be empty",
        });
    }
    if s.len() > max_len {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "too long",
        });
    }
    if !s.is_ascii() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must be ASCII",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_record_validates_geofence_parameters() {
        let rec = SessionRecord::v1(
            SessionId::new("s_1").unwrap(),
            GeoPoint::new(12.9716, 77.5946).unwrap(),
            RadiusM::new(50.0).unwrap(),
            RosterRef::new("roster_s_1").unwrap(),
            BiometricPolicy::Disabled,
            MonotonicTimeNs(1),
        );
        assert!(rec.is_ok());
    }

    #[test]
    fn session_id_must_be_ascii_and_bounded() {
        assert!(SessionId::new("").is_err());
        assert!(SessionId::new("   ").is_err());
        assert!(SessionId::new("sessão").is_err());
        assert!(SessionId::new("x".repeat(65)).is_err());
    }
}

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use crate::common::DayKey;
use crate::{ContractViolation, Validate};

/// Stable roster key (roll number or equivalent), unique within a roster.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdentityId(String);

impl IdentityId {
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

impl Validate for IdentityId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "identity_id",
                reason: "must not be empty",
            });
        }
        if self.0.len() > 64 {
            return Err(ContractViolation::InvalidValue {
                field: "identity_id",
                reason: "must be <= 64 chars",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DisplayName(String);

impl DisplayName {
    pub fn new(name: impl Into<String>) -> Result<Self, ContractViolation> {
        let name = name.into();
        let v = Self(name);
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for DisplayName {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "display_name",
                reason: "must not be empty",
            });
        }
        if self.0.len() > 128 {
            return Err(ContractViolation::InvalidValue {
                field: "display_name",
                reason: "must be <= 128 chars",
            });
        }
        Ok(())
    }
}

/// One enrolled identity plus its day-column of presence marks. Marks are
/// written only by the engine's commit step (or forced to 0 by the export
/// recompute pass); at most one mark per day.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterRow {
    pub identity_id: IdentityId,
    pub display_name: DisplayName,
    pub present: BTreeMap<DayKey, bool>,
}

impl RosterRow {
    pub fn v1(identity_id: IdentityId, display_name: DisplayName) -> Self {
        Self {
            identity_id,
            display_name,
            present: BTreeMap::new(),
        }
    }

    pub fn is_present(&self, day: &DayKey) -> bool {
        self.present.get(day).copied().unwrap_or(false)
    }
}

impl Validate for RosterRow {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.identity_id.validate()?;
        self.display_name.validate()?;
        for day in self.present.keys() {
            day.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_starts_without_marks() {
        let row = RosterRow::v1(
            IdentityId::new("21").unwrap(),
            DisplayName::new("Asha").unwrap(),
        );
        let day = DayKey::new("2026-08-29").unwrap();
        assert!(!row.is_present(&day));
        assert!(row.validate().is_ok());
    }

    #[test]
    fn identity_id_rejects_blank_input() {
        assert!(IdentityId::new("  ").is_err());
        assert!(DisplayName::new("").is_err());
    }
}

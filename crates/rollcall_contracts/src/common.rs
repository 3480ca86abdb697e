#![forbid(unsafe_code)]

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonotonicTimeNs(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReasonCodeId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum ContractViolation {
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
    InvalidRange {
        field: &'static str,
        min: f64,
        max: f64,
        got: f64,
    },
    NotFinite {
        field: &'static str,
    },
}

pub trait Validate {
    fn validate(&self) -> Result<(), ContractViolation>;
}

/// Calendar day key in `YYYY-MM-DD` form. Attendance marks are keyed by day;
/// the calendar mapping from wall-clock time is the caller's concern.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayKey(String);

impl DayKey {
    pub fn new(key: impl Into<String>) -> Result<Self, ContractViolation> {
        let key = key.into();
        let v = Self(key);
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for DayKey {
    fn validate(&self) -> Result<(), ContractViolation> {
        let b = self.0.as_bytes();
        if b.len() != 10 || b[4] != b'-' || b[7] != b'-' {
            return Err(ContractViolation::InvalidValue {
                field: "day_key",
                reason: "must be YYYY-MM-DD",
            });
        }
        for (i, c) in b.iter().enumerate() {
            if i == 4 || i == 7 {
                continue;
            }
            if !c.is_ascii_digit() {
                return Err(ContractViolation::InvalidValue {
                    field: "day_key",
                    reason: "must be YYYY-MM-DD",
                });
            }
        }
        let month = (b[5] - b'0') * 10 + (b[6] - b'0');
        let day = (b[8] - b'0') * 10 + (b[9] - b'0');
        if month < 1 || month > 12 {
            return Err(ContractViolation::InvalidValue {
                field: "day_key",
                reason: "month must be 01..=12",
            });
        }
        if day < 1 || day > 31 {
            return Err(ContractViolation::InvalidValue {
                field: "day_key",
                reason: "day must be 01..=31",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_key_accepts_calendar_shape() {
        assert!(DayKey::new("2026-08-29").is_ok());
        assert!(DayKey::new("2026-01-01").is_ok());
    }

    #[test]
    fn day_key_rejects_malformed_input() {
        assert!(DayKey::new("2026-8-29").is_err());
        assert!(DayKey::new("2026/08/29").is_err());
        assert!(DayKey::new("2026-13-01").is_err());
        assert!(DayKey::new("2026-00-10").is_err());
        assert!(DayKey::new("2026-02-32").is_err());
        assert!(DayKey::new("").is_err());
    }
}

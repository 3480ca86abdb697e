#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use crate::roster::IdentityId;
use crate::{ContractViolation, Validate};

/// Opaque caller-supplied composite key identifying the submitting client
/// or origin. The engine never inspects it; derivation (network origin,
/// client-held token, or both) is the enclosing layer's concern.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceFingerprint(String);

impl DeviceFingerprint {
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

impl Validate for DeviceFingerprint {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "device_fingerprint",
                reason: "must not be empty",
            });
        }
        if self.0.len() > 128 {
            return Err(ContractViolation::InvalidValue {
                field: "device_fingerprint",
                reason: "must be <= 128 chars",
            });
        }
        if !self.0.is_ascii() {
            return Err(ContractViolation::InvalidValue {
                field: "device_fingerprint",
                reason: "must be ASCII",
            });
        }
        Ok(())
    }
}

/// Per-session dedup state. Lifetime = session lifetime.
///
/// Invariant A: an identity appears in `marked_identities` at most once, and
/// only after a fully accepted pipeline run.
/// Invariant B: a fingerprint maps to at most one identity and is never
/// rebound; a submission that would rebind it is rejected instead.
///
/// The data lives here; the check/commit policy over it is the duplicate
/// guard in `rollcall_engines`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuplicateLedger {
    marked_identities: BTreeSet<IdentityId>,
    device_claims: BTreeMap<DeviceFingerprint, IdentityId>,
}

impl DuplicateLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_marked(&self, identity_id: &IdentityId) -> bool {
        self.marked_identities.contains(identity_id)
    }

    pub fn device_claim(&self, fingerprint: &DeviceFingerprint) -> Option<&IdentityId> {
        self.device_claims.get(fingerprint)
    }

    pub fn marked_identities(&self) -> &BTreeSet<IdentityId> {
        &self.marked_identities
    }

    /// Records a fully accepted submission. Both insertions must be guarded
    /// by the duplicate check; double-insertion is a contract violation.
    pub fn record(
        &mut self,
        identity_id: IdentityId,
        fingerprint: DeviceFingerprint,
    ) -> Result<(), ContractViolation> {
        if self.marked_identities.contains(&identity_id) {
            return Err(ContractViolation::InvalidValue {
                field: "duplicate_ledger.marked_identities",
                reason: "identity already marked",
            });
        }
        if let Some(bound) = self.device_claims.get(&fingerprint) {
            if bound != &identity_id {
                return Err(ContractViolation::InvalidValue {
                    field: "duplicate_ledger.device_claims",
                    reason: "fingerprint already bound to another identity",
                });
            }
        }
        self.marked_identities.insert(identity_id.clone());
        self.device_claims.insert(fingerprint, identity_id);
        Ok(())
    }

    /// Best-effort restart recovery: seeds `marked_identities` from a roster
    /// day-column. Device claims are not recoverable from the roster and
    /// start empty.
    pub fn seed_marked(&mut self, identities: impl IntoIterator<Item = IdentityId>) {
        for id in identities {
            self.marked_identities.insert(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> IdentityId {
        IdentityId::new(s).unwrap()
    }

    fn fp(s: &str) -> DeviceFingerprint {
        DeviceFingerprint::new(s).unwrap()
    }

    #[test]
    fn record_refuses_double_identity() {
        let mut ledger = DuplicateLedger::new();
        ledger.record(id("21"), fp("dev_a")).unwrap();
        assert!(ledger.record(id("21"), fp("dev_b")).is_err());
    }

    #[test]
    fn record_refuses_fingerprint_rebind() {
        let mut ledger = DuplicateLedger::new();
        ledger.record(id("21"), fp("dev_a")).unwrap();
        assert!(ledger.record(id("22"), fp("dev_a")).is_err());
        assert_eq!(ledger.device_claim(&fp("dev_a")), Some(&id("21")));
    }

    #[test]
    fn seed_marked_rebuilds_identity_side_only() {
        let mut ledger = DuplicateLedger::new();
        ledger.seed_marked(vec![id("21"), id("22")]);
        assert!(ledger.is_marked(&id("21")));
        assert!(ledger.is_marked(&id("22")));
        assert!(ledger.device_claim(&fp("dev_a")).is_none());
    }
}

#![forbid(unsafe_code)]

use sha2::{Digest, Sha256};

use rollcall_contracts::common::DayKey;
use rollcall_contracts::dedup::{DeviceFingerprint, DuplicateLedger};
use rollcall_contracts::roster::{IdentityId, RosterRow};
use rollcall_contracts::ContractViolation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateVerdict {
    Clear,
    AlreadyMarked,
    DeviceReused { bound_to: IdentityId },
}

/// Duplicate policy over a session's ledger. The guard is stateless; the
/// ledger it reads and commits lives with the session.
#[derive(Debug, Default, Clone)]
pub struct DuplicateGuard;

impl DuplicateGuard {
    /// Fixed check order: identity first, then device. A repeat submission
    /// from the same device for the same already-marked identity therefore
    /// stays `AlreadyMarked` no matter how often it is retried.
    pub fn check(
        ledger: &DuplicateLedger,
        identity_id: &IdentityId,
        fingerprint: &DeviceFingerprint,
    ) -> DuplicateVerdict {
        if ledger.is_marked(identity_id) {
            return DuplicateVerdict::AlreadyMarked;
        }
        if let Some(bound) = ledger.device_claim(fingerprint) {
            if bound != identity_id {
                return DuplicateVerdict::DeviceReused {
                    bound_to: bound.clone(),
                };
            }
        }
        DuplicateVerdict::Clear
    }

    /// The single mutating call. Only reached after every other pipeline
    /// stage passed, under the session's critical section.
    pub fn commit(
        ledger: &mut DuplicateLedger,
        identity_id: IdentityId,
        fingerprint: DeviceFingerprint,
    ) -> Result<(), ContractViolation> {
        ledger.record(identity_id, fingerprint)
    }

    /// Best-effort recovery after a restart: a row already marked for the
    /// day implies the identity belongs in `marked_identities`.
    pub fn rebuild_from_day(rows: &[RosterRow], day: &DayKey) -> DuplicateLedger {
        let mut ledger = DuplicateLedger::new();
        ledger.seed_marked(
            rows.iter()
                .filter(|row| row.is_present(day))
                .map(|row| row.identity_id.clone()),
        );
        ledger
    }
}

/// Derives an opaque fingerprint from a network origin and a client-held
/// token, `origin_token` composed then hashed. Provided for the enclosing
/// layer; the engine itself treats fingerprints as opaque.
pub fn derive_fingerprint(
    origin: &str,
    token: &str,
) -> Result<DeviceFingerprint, ContractViolation> {
    let mut hasher = Sha256::new();
    hasher.update(origin.as_bytes());
    hasher.update(b"_");
    hasher.update(token.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    DeviceFingerprint::new(hex)
}

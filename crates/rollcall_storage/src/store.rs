#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use rollcall_contracts::audit::{AuditEvent, AuditEventId, AuditEventInput};
use rollcall_contracts::biometric::BiometricReference;
use rollcall_contracts::common::DayKey;
use rollcall_contracts::dedup::DuplicateLedger;
use rollcall_contracts::roster::{IdentityId, RosterRow};
use rollcall_contracts::session::{SessionId, SessionRecord};
use rollcall_contracts::{ContractViolation, Validate};

#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    ForeignKeyViolation { table: &'static str, key: String },
    DuplicateKey { table: &'static str, key: String },
    AppendOnlyViolation { table: &'static str },
    ContractViolation(ContractViolation),
}

impl From<ContractViolation> for StorageError {
    fn from(v: ContractViolation) -> Self {
        StorageError::ContractViolation(v)
    }
}

/// Read side of the session registry. Sessions are created by the upload
/// collaborator and never deleted during process lifetime; the engine only
/// looks them up.
pub trait SessionRegistry {
    fn lookup(&self, session_id: &SessionId) -> Option<&SessionRecord>;
}

/// The roster accessor contract: the engine never owns the roster table,
/// it reads snapshots and requests single-day marks through this seam.
pub trait RosterAccessor {
    fn snapshot(&self) -> &[RosterRow];
    /// Sets the identity's mark for the day to 1. Idempotent: re-marking an
    /// already-marked (identity, day) is a no-op success.
    fn mark(&mut self, identity_id: &IdentityId, day: &DayKey) -> Result<(), StorageError>;
}

/// Enrollment reference store. Write-once per identity.
pub trait BiometricStore {
    fn reference(&self, identity_id: &IdentityId) -> Option<&BiometricReference>;
    fn register(&mut self, reference: BiometricReference) -> Result<(), StorageError>;
}

/// Everything one session's submissions mutate: its roster table and its
/// duplicate ledger. The orchestrator wraps each scope in the session's
/// lock, so a `&mut SessionScope` *is* the critical section.
#[derive(Debug, Clone)]
pub struct SessionScope {
    roster: Vec<RosterRow>,
    ledger: DuplicateLedger,
}

impl SessionScope {
    pub fn new(roster: Vec<RosterRow>) -> Result<Self, StorageError> {
        let mut seen = BTreeSet::new();
        for row in &roster {
            row.validate()?;
            if !seen.insert(row.identity_id.clone()) {
                return Err(StorageError::DuplicateKey {
                    table: "roster",
                    key: row.identity_id.as_str().to_string(),
                });
            }
        }
        Ok(Self {
            roster,
            ledger: DuplicateLedger::new(),
        })
    }

    pub fn ledger(&self) -> &DuplicateLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut DuplicateLedger {
        &mut self.ledger
    }

    pub fn replace_ledger(&mut self, ledger: DuplicateLedger) {
        self.ledger = ledger;
    }

    /// Export-time recompute: forces the day's mark to 0 for every row not
    /// present in the ledger's marked set, guarding against marks written
    /// by any path other than the commit step.
    pub fn recompute_day(&mut self, day: &DayKey) {
        let marked = self.ledger.marked_identities().clone();
        for row in &mut self.roster {
            if !marked.contains(&row.identity_id) {
                row.present.insert(day.clone(), false);
            }
        }
    }

    /// Day-sheet rendering for download: `identity_id,display_name,<day>`
    /// with 1/0 marks, roster order preserved.
    pub fn day_sheet_csv(&self, day: &DayKey) -> String {
        let mut out = String::new();
        out.push_str("identity_id,display_name,");
        out.push_str(day.as_str());
        out.push('\n');
        for row in &self.roster {
            out.push_str(&csv_field(row.identity_id.as_str()));
            out.push(',');
            out.push_str(&csv_field(row.display_name.as_str()));
            out.push(',');
            out.push(if row.is_present(day) { '1' } else { '0' });
            out.push('\n');
        }
        out
    }
}

impl RosterAccessor for SessionScope {
    fn snapshot(&self) -> &[RosterRow] {
        &self.roster
    }

    fn mark(&mut self, identity_id: &IdentityId, day: &DayKey) -> Result<(), StorageError> {
        let row = self
            .roster
            .iter_mut()
            .find(|row| &row.identity_id == identity_id)
            .ok_or_else(|| StorageError::ForeignKeyViolation {
                table: "roster",
                key: identity_id.as_str().to_string(),
            })?;
        row.present.insert(day.clone(), true);
        Ok(())
    }
}

fn csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        let escaped = s.replace('"', "\"\"");
        format!("\"{escaped}\"")
    } else {
        s.to_string()
    }
}

/// Process-wide store: immutable session records, write-once biometric
/// references, and the append-only audit ledger.
#[derive(Debug, Default)]
pub struct RollcallStore {
    sessions: BTreeMap<SessionId, SessionRecord>,
    biometric_refs: BTreeMap<IdentityId, BiometricReference>,
    audit_ledger: Vec<AuditEvent>,
    next_audit_event_id: u64,
}

impl RollcallStore {
    pub fn new_in_memory() -> Self {
        Self {
            sessions: BTreeMap::new(),
            biometric_refs: BTreeMap::new(),
            audit_ledger: Vec::new(),
            next_audit_event_id: 1,
        }
    }

    pub fn insert_session(&mut self, record: SessionRecord) -> Result<(), StorageError> {
        record.validate()?;
        let key = record.session_id.clone();
        if self.sessions.contains_key(&key) {
            return Err(StorageError::DuplicateKey {
                table: "sessions",
                key: key.as_str().to_string(),
            });
        }
        self.sessions.insert(key, record);
        Ok(())
    }

    pub fn append_audit_event(
        &mut self,
        input: AuditEventInput,
    ) -> Result<AuditEventId, StorageError> {
        input.validate()?;
        let id = AuditEventId(self.next_audit_event_id);
        self.next_audit_event_id = self.next_audit_event_id.checked_add(1).ok_or(
            StorageError::AppendOnlyViolation {
                table: "audit_ledger",
            },
        )?;
        self.audit_ledger.push(AuditEvent {
            audit_event_id: id,
            input,
        });
        Ok(id)
    }

    pub fn audit_events(&self) -> &[AuditEvent] {
        &self.audit_ledger
    }
}

impl SessionRegistry for RollcallStore {
    fn lookup(&self, session_id: &SessionId) -> Option<&SessionRecord> {
        self.sessions.get(session_id)
    }
}

impl BiometricStore for RollcallStore {
    fn reference(&self, identity_id: &IdentityId) -> Option<&BiometricReference> {
        self.biometric_refs.get(identity_id)
    }

    fn register(&mut self, reference: BiometricReference) -> Result<(), StorageError> {
        reference.validate()?;
        let key = reference.identity_id.clone();
        if self.biometric_refs.contains_key(&key) {
            return Err(StorageError::DuplicateKey {
                table: "biometric_refs",
                key: key.as_str().to_string(),
            });
        }
        self.biometric_refs.insert(key, reference);
        Ok(())
    }
}

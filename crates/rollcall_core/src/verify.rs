#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use rand::RngCore;

use rollcall_contracts::audit::{
    AuditArea, AuditEvent, AuditEventInput, AuditEventType, AuditSeverity, CorrelationId,
    PayloadKey, PayloadValue, TurnId,
};
use rollcall_contracts::biometric::BiometricReference;
use rollcall_contracts::common::DayKey;
use rollcall_contracts::dedup::DeviceFingerprint;
use rollcall_contracts::geo::{GeoPoint, RadiusM};
use rollcall_contracts::roster::{DisplayName, IdentityId, RosterRow};
use rollcall_contracts::session::{BiometricPolicy, RosterRef, SessionId, SessionRecord};
use rollcall_contracts::verify::{
    reason_codes, RejectReason, SubmissionRequest, VerifyAccepted, VerifyRejected, VerifyResponse,
};
use rollcall_contracts::{MonotonicTimeNs, Validate};
use rollcall_engines::biometric::{
    self, BiometricConfig, BiometricOutcome, BiometricReject, FaceEmbedder,
};
use rollcall_engines::dedup::{DuplicateGuard, DuplicateVerdict};
use rollcall_engines::geofence::{self, GeofenceVerdict};
use rollcall_engines::identity::{self, IdentityVerdict};
use rollcall_storage::store::{
    BiometricStore, RollcallStore, RosterAccessor, SessionScope, StorageError,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerifyConfig {
    pub biometric: BiometricConfig,
}

impl VerifyConfig {
    pub fn mvp_v1() -> Self {
        Self {
            biometric: BiometricConfig::mvp_v1(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegisterResponse {
    Registered { identity_id: IdentityId },
    Rejected(VerifyRejected),
}

/// Everything one session's submissions touch: the immutable record plus
/// the lock-guarded mutable scope (roster + duplicate ledger). Submissions
/// for different sessions never contend.
struct SessionSlot {
    record: SessionRecord,
    scope: Mutex<SessionScope>,
}

/// The attendance verification engine. Single public entry point is
/// `submit`; session creation, reference registration, ledger rebuild and
/// day-sheet export are the collaborator-facing operations around it.
pub struct VerifyService {
    config: VerifyConfig,
    embedder: Arc<dyn FaceEmbedder + Send + Sync>,
    slots: RwLock<BTreeMap<SessionId, Arc<SessionSlot>>>,
    store: Mutex<RollcallStore>,
}

impl VerifyService {
    pub fn new(config: VerifyConfig, embedder: Arc<dyn FaceEmbedder + Send + Sync>) -> Self {
        Self {
            config,
            embedder,
            slots: RwLock::new(BTreeMap::new()),
            store: Mutex::new(RollcallStore::new_in_memory()),
        }
    }

    /// Upload-collaborator path: mints the opaque session token, stores the
    /// immutable record and the roster, and starts an empty ledger.
    #[allow(clippy::too_many_arguments)]
    pub fn create_session(
        &self,
        now: MonotonicTimeNs,
        correlation_id: CorrelationId,
        turn_id: TurnId,
        center: GeoPoint,
        radius_m: RadiusM,
        biometric_policy: BiometricPolicy,
        roster: Vec<RosterRow>,
    ) -> Result<SessionRecord, StorageError> {
        let session_id = SessionId::new(mint_session_token())?;
        let roster_ref = RosterRef::new(format!("roster_{}", session_id.as_str()))?;
        let record = SessionRecord::v1(
            session_id.clone(),
            center,
            radius_m,
            roster_ref,
            biometric_policy,
            now,
        )?;
        let scope = SessionScope::new(roster)?;

        {
            let mut store = self.lock_store();
            store.insert_session(record.clone())?;
        }
        {
            let mut slots = self.write_slots();
            slots.insert(
                session_id.clone(),
                Arc::new(SessionSlot {
                    record: record.clone(),
                    scope: Mutex::new(scope),
                }),
            );
        }

        self.audit(
            now,
            correlation_id,
            turn_id,
            AuditArea::Registry,
            AuditEventType::SessionCreated,
            AuditSeverity::Info,
            reason_codes::REGISTRY_OK_SESSION_CREATED,
            Some(session_id),
            None,
            &[],
        )?;
        Ok(record)
    }

    /// Registry read for collaborators (scan-page rendering and the like).
    pub fn session(&self, session_id: &SessionId) -> Option<SessionRecord> {
        self.read_slots()
            .get(session_id)
            .map(|slot| slot.record.clone())
    }

    /// Ordered (identity, name) pairs for scan display. Clones under the
    /// session lock and renders outside it.
    pub fn scan_snapshot(
        &self,
        session_id: &SessionId,
    ) -> Option<Vec<(IdentityId, DisplayName)>> {
        let slot = self.slot(session_id)?;
        let scope = lock_scope(&slot);
        Some(
            scope
                .snapshot()
                .iter()
                .map(|row| (row.identity_id.clone(), row.display_name.clone()))
                .collect(),
        )
    }

    /// Enrollment registration: the same decode/quality/extraction pipeline
    /// as verification, then a write-once store insert. Re-registration
    /// surfaces as a `DuplicateKey` storage error by policy.
    pub fn register_reference(
        &self,
        now: MonotonicTimeNs,
        correlation_id: CorrelationId,
        turn_id: TurnId,
        identity_id: IdentityId,
        image_bytes: &[u8],
    ) -> Result<RegisterResponse, StorageError> {
        let embedding = match biometric::embed_sample(
            image_bytes,
            self.embedder.as_ref(),
            &self.config.biometric,
        ) {
            Ok(embedding) => embedding,
            Err(reject) => {
                let (reason, detail) = map_biometric_reject(reject);
                return Ok(RegisterResponse::Rejected(VerifyRejected::v1(
                    reason, detail,
                )?));
            }
        };
        let reference = BiometricReference::v1(identity_id.clone(), embedding)?;
        {
            let mut store = self.lock_store();
            store.register(reference)?;
        }
        self.audit(
            now,
            correlation_id,
            turn_id,
            AuditArea::Biometric,
            AuditEventType::ReferenceRegistered,
            AuditSeverity::Info,
            reason_codes::BIOMETRIC_OK_REFERENCE_REGISTERED,
            None,
            Some(identity_id.clone()),
            &[],
        )?;
        Ok(RegisterResponse::Registered { identity_id })
    }

    /// The single public verification entry point. Fixed stage order with
    /// short-circuit rejection:
    /// session lookup -> geofence -> identity -> duplicate (pre) ->
    /// [biometric] -> commit.
    ///
    /// The biometric stage runs outside the session's critical section;
    /// duplicate state is re-validated inside the commit section since it
    /// may have changed while the match computation ran.
    pub fn submit(&self, req: &SubmissionRequest) -> Result<VerifyResponse, StorageError> {
        req.validate()?;

        let Some(slot) = self.slot(&req.session_id) else {
            return self.reject(req, RejectReason::UnknownSession, "unknown session token");
        };

        let fix = match GeoPoint::new(req.fix_lat_deg, req.fix_lon_deg) {
            Ok(fix) => fix,
            Err(_) => {
                return self.reject(
                    req,
                    RejectReason::InvalidCoordinate,
                    "location fix is not a valid coordinate",
                );
            }
        };

        let distance_m = match geofence::check(&slot.record.center, &slot.record.radius_m, &fix) {
            GeofenceVerdict::Within { distance_m } => distance_m,
            GeofenceVerdict::Outside { distance_m } => {
                return self.reject(
                    req,
                    RejectReason::OutOfRange { distance_m },
                    format!("outside the allowed area (distance: {distance_m:.2} m)"),
                );
            }
        };

        // Pre-check under the session lock: identity claim and duplicate
        // state. The canonical identity is the roster row's, not the
        // claim's raw spelling.
        let canonical = {
            let scope = lock_scope(&slot);
            let canonical = match identity::match_claim(
                scope.snapshot(),
                &req.identity_id,
                &req.claimed_name,
            ) {
                IdentityVerdict::Matched { row } => scope.snapshot()[row].identity_id.clone(),
                IdentityVerdict::NotInRoster => {
                    drop(scope);
                    return self.reject(
                        req,
                        RejectReason::NotInRoster,
                        "identity is not on this session's roster",
                    );
                }
                IdentityVerdict::NameMismatch => {
                    drop(scope);
                    return self.reject(
                        req,
                        RejectReason::NameMismatch,
                        "name does not match the roster entry for this identity",
                    );
                }
            };
            match DuplicateGuard::check(scope.ledger(), &canonical, &req.device_fingerprint) {
                DuplicateVerdict::Clear => {}
                DuplicateVerdict::AlreadyMarked => {
                    drop(scope);
                    return self.reject(
                        req,
                        RejectReason::AlreadyMarked,
                        "attendance already marked for this identity",
                    );
                }
                DuplicateVerdict::DeviceReused { .. } => {
                    drop(scope);
                    return self.reject(
                        req,
                        RejectReason::DeviceReused,
                        "attendance already submitted from this device",
                    );
                }
            }
            canonical
        };

        // CPU-heavy stage, outside the critical section.
        let biometric_distance = match slot.record.biometric_policy {
            BiometricPolicy::Disabled => None,
            BiometricPolicy::Required => {
                let Some(sample) = req.biometric_sample.as_deref() else {
                    return self.reject(
                        req,
                        RejectReason::UndecodableImage,
                        "no biometric sample provided",
                    );
                };
                let reference = {
                    let store = self.lock_store();
                    store.reference(&canonical).cloned()
                };
                let Some(reference) = reference else {
                    return self.reject(
                        req,
                        RejectReason::NotRegistered,
                        "no biometric reference registered for this identity",
                    );
                };
                match biometric::verify_sample(
                    &reference.embedding,
                    sample,
                    self.embedder.as_ref(),
                    &self.config.biometric,
                ) {
                    Ok(BiometricOutcome::Match { distance }) => Some(distance),
                    Ok(BiometricOutcome::Mismatch { distance }) => {
                        return self.reject(
                            req,
                            RejectReason::FaceMismatch { distance },
                            format!("face does not match the reference (distance: {distance:.3})"),
                        );
                    }
                    Err(reject) => {
                        let (reason, detail) = map_biometric_reject(reject);
                        return self.reject(req, reason, detail);
                    }
                }
            }
        };

        // Commit section: re-validate duplicate state, then roster mark,
        // then ledger commit. The ledger commit happens only after the mark
        // acknowledgment, so there is no interleaving that leaves a partial
        // commit behind.
        let outcome = {
            let mut scope = lock_scope(&slot);
            commit_mark(&mut scope, &canonical, &req.day, &req.device_fingerprint)?
        };
        match outcome {
            CommitOutcome::Committed => {
                let accepted =
                    VerifyAccepted::v1(canonical, req.day.clone(), distance_m, biometric_distance)?;
                self.audit(
                    req.now,
                    req.correlation_id,
                    req.turn_id,
                    AuditArea::Verify,
                    AuditEventType::SubmissionAccepted,
                    AuditSeverity::Info,
                    accepted.reason_code,
                    Some(req.session_id.clone()),
                    Some(accepted.identity_id.clone()),
                    &[("distance_m", format!("{distance_m:.2}"))],
                )?;
                Ok(VerifyResponse::Accepted(accepted))
            }
            CommitOutcome::Rejected(RejectReason::AlreadyMarked) => self.reject(
                req,
                RejectReason::AlreadyMarked,
                "attendance already marked for this identity",
            ),
            CommitOutcome::Rejected(RejectReason::DeviceReused) => self.reject(
                req,
                RejectReason::DeviceReused,
                "attendance already submitted from this device",
            ),
            CommitOutcome::Rejected(reason) => {
                self.reject(req, reason, "attendance mark could not be written")
            }
        }
    }

    /// Best-effort restart recovery: reseeds the ledger's identity side
    /// from the roster's day-column. Device claims are not recoverable.
    pub fn rebuild_ledger(&self, session_id: &SessionId, day: &DayKey) -> Result<(), StorageError> {
        let slot = self
            .slot(session_id)
            .ok_or_else(|| unknown_session(session_id))?;
        let mut scope = lock_scope(&slot);
        let ledger = DuplicateGuard::rebuild_from_day(scope.snapshot(), day);
        scope.replace_ledger(ledger);
        Ok(())
    }

    /// Download path: recomputes the day-column against the ledger (rows
    /// without an accepted submission are forced to 0), then renders the
    /// CSV day-sheet.
    pub fn day_sheet(
        &self,
        now: MonotonicTimeNs,
        correlation_id: CorrelationId,
        turn_id: TurnId,
        session_id: &SessionId,
        day: &DayKey,
    ) -> Result<String, StorageError> {
        let slot = self
            .slot(session_id)
            .ok_or_else(|| unknown_session(session_id))?;
        let csv = {
            let mut scope = lock_scope(&slot);
            scope.recompute_day(day);
            scope.day_sheet_csv(day)
        };
        self.audit(
            now,
            correlation_id,
            turn_id,
            AuditArea::Export,
            AuditEventType::DaySheetExported,
            AuditSeverity::Info,
            reason_codes::EXPORT_OK_DAY_SHEET,
            Some(session_id.clone()),
            None,
            &[("day", day.as_str().to_string())],
        )?;
        Ok(csv)
    }

    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.lock_store().audit_events().to_vec()
    }

    fn slot(&self, session_id: &SessionId) -> Option<Arc<SessionSlot>> {
        self.read_slots().get(session_id).cloned()
    }

    fn reject(
        &self,
        req: &SubmissionRequest,
        reason: RejectReason,
        detail: impl Into<String>,
    ) -> Result<VerifyResponse, StorageError> {
        let rejected = VerifyRejected::v1(reason, detail)?;
        self.audit(
            req.now,
            req.correlation_id,
            req.turn_id,
            AuditArea::Verify,
            AuditEventType::SubmissionRejected,
            AuditSeverity::Warn,
            rejected.reason_code,
            Some(req.session_id.clone()),
            Some(req.identity_id.clone()),
            &[],
        )?;
        Ok(VerifyResponse::Rejected(rejected))
    }

    #[allow(clippy::too_many_arguments)]
    fn audit(
        &self,
        now: MonotonicTimeNs,
        correlation_id: CorrelationId,
        turn_id: TurnId,
        area: AuditArea,
        event_type: AuditEventType,
        severity: AuditSeverity,
        reason_code: rollcall_contracts::ReasonCodeId,
        session_id: Option<SessionId>,
        identity_id: Option<IdentityId>,
        detail_entries: &[(&'static str, String)],
    ) -> Result<(), StorageError> {
        let mut payload = BTreeMap::new();
        for (key, value) in detail_entries {
            payload.insert(PayloadKey::new(*key)?, PayloadValue::new(value.clone())?);
        }
        let input = AuditEventInput::v1(
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
        )?;
        let mut store = self.lock_store();
        store.append_audit_event(input)?;
        Ok(())
    }

    fn lock_store(&self) -> std::sync::MutexGuard<'_, RollcallStore> {
        match self.store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn read_slots(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, BTreeMap<SessionId, Arc<SessionSlot>>> {
        match self.slots.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_slots(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, BTreeMap<SessionId, Arc<SessionSlot>>> {
        match self.slots.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum CommitOutcome {
    Committed,
    Rejected(RejectReason),
}

/// The serialized commit step. Duplicate state is re-checked first because
/// it may have advanced since the pre-check; the ledger commit only runs
/// after the roster mark acknowledged, so a write failure leaves the ledger
/// untouched and the submission maps to `WriteFailed` with no partial
/// state.
fn commit_mark(
    scope: &mut SessionScope,
    identity_id: &IdentityId,
    day: &DayKey,
    fingerprint: &DeviceFingerprint,
) -> Result<CommitOutcome, StorageError> {
    match DuplicateGuard::check(scope.ledger(), identity_id, fingerprint) {
        DuplicateVerdict::Clear => {}
        DuplicateVerdict::AlreadyMarked => {
            return Ok(CommitOutcome::Rejected(RejectReason::AlreadyMarked));
        }
        DuplicateVerdict::DeviceReused { .. } => {
            return Ok(CommitOutcome::Rejected(RejectReason::DeviceReused));
        }
    }
    if scope.mark(identity_id, day).is_err() {
        return Ok(CommitOutcome::Rejected(RejectReason::WriteFailed));
    }
    DuplicateGuard::commit(scope.ledger_mut(), identity_id.clone(), fingerprint.clone())
        .map_err(StorageError::ContractViolation)?;
    Ok(CommitOutcome::Committed)
}

fn map_biometric_reject(reject: BiometricReject) -> (RejectReason, String) {
    match reject {
        BiometricReject::UndecodableImage => (
            RejectReason::UndecodableImage,
            "biometric sample could not be decoded".to_string(),
        ),
        BiometricReject::UnsupportedFormat => (
            RejectReason::UnsupportedFormat,
            "biometric sample has an unsupported channel layout".to_string(),
        ),
        BiometricReject::ImageTooBlurry { score } => (
            RejectReason::ImageTooBlurry { score },
            format!("biometric sample too blurry (sharpness: {score:.1})"),
        ),
        BiometricReject::NoFaceDetected => (
            RejectReason::NoFaceDetected,
            "no face detected in the biometric sample".to_string(),
        ),
    }
}

fn unknown_session(session_id: &SessionId) -> StorageError {
    StorageError::ForeignKeyViolation {
        table: "sessions",
        key: session_id.as_str().to_string(),
    }
}

fn mint_session_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn lock_scope(slot: &SessionSlot) -> std::sync::MutexGuard<'_, SessionScope> {
    match slot.scope.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_contracts::roster::RosterRow;

    fn id(s: &str) -> IdentityId {
        IdentityId::new(s).unwrap()
    }

    fn scope_with(rows: &[(&str, &str)]) -> SessionScope {
        SessionScope::new(
            rows.iter()
                .map(|(identity, name)| {
                    RosterRow::v1(id(identity), DisplayName::new(*name).unwrap())
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn commit_mark_is_atomic_when_the_roster_write_fails() {
        // Identity absent from the roster: the mark fails, and the ledger
        // must stay uncommitted.
        let mut scope = scope_with(&[("21", "Asha")]);
        let day = DayKey::new("2026-08-29").unwrap();
        let fp = DeviceFingerprint::new("dev_a").unwrap();

        let outcome = commit_mark(&mut scope, &id("99"), &day, &fp).unwrap();
        assert_eq!(outcome, CommitOutcome::Rejected(RejectReason::WriteFailed));
        assert!(!scope.ledger().is_marked(&id("99")));
        assert!(scope.ledger().device_claim(&fp).is_none());
    }

    #[test]
    fn commit_mark_recheck_catches_a_concurrent_winner() {
        let mut scope = scope_with(&[("21", "Asha"), ("22", "Ravi")]);
        let day = DayKey::new("2026-08-29").unwrap();
        let fp = DeviceFingerprint::new("dev_a").unwrap();

        assert_eq!(
            commit_mark(&mut scope, &id("21"), &day, &fp).unwrap(),
            CommitOutcome::Committed
        );
        assert_eq!(
            commit_mark(&mut scope, &id("21"), &day, &fp).unwrap(),
            CommitOutcome::Rejected(RejectReason::AlreadyMarked)
        );
        assert_eq!(
            commit_mark(&mut scope, &id("22"), &day, &fp).unwrap(),
            CommitOutcome::Rejected(RejectReason::DeviceReused)
        );
    }

    #[test]
    fn minted_tokens_are_hex_and_distinct() {
        let a = mint_session_token();
        let b = mint_session_token();
        assert_eq!(a.len(), 32);
        assert!(a.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}

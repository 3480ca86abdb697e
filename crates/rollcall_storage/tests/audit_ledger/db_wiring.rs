#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use rollcall_contracts::audit::{
    AuditArea, AuditEventInput, AuditEventType, AuditSeverity, CorrelationId, TurnId,
};
use rollcall_contracts::biometric::{BiometricReference, FaceEmbedding, FACE_EMBEDDING_DIM};
use rollcall_contracts::geo::{GeoPoint, RadiusM};
use rollcall_contracts::roster::IdentityId;
use rollcall_contracts::session::{BiometricPolicy, RosterRef, SessionId, SessionRecord};
use rollcall_contracts::{MonotonicTimeNs, ReasonCodeId};
use rollcall_storage::store::{BiometricStore, RollcallStore, SessionRegistry, StorageError};

fn event(t: u64, code: u32) -> AuditEventInput {
    AuditEventInput::v1(
        MonotonicTimeNs(t),
        CorrelationId(7),
        TurnId(1),
        AuditArea::Verify,
        AuditEventType::SubmissionAccepted,
        AuditSeverity::Info,
        ReasonCodeId(code),
        None,
        None,
        BTreeMap::new(),
    )
    .unwrap()
}

fn session(id: &str) -> SessionRecord {
    SessionRecord::v1(
        SessionId::new(id).unwrap(),
        GeoPoint::new(0.0, 0.0).unwrap(),
        RadiusM::new(10.0).unwrap(),
        RosterRef::new(format!("roster_{id}")).unwrap(),
        BiometricPolicy::Disabled,
        MonotonicTimeNs(1),
    )
    .unwrap()
}

#[test]
fn at_audit_db_01_event_ids_are_monotonic_and_append_only() {
    let mut store = RollcallStore::new_in_memory();
    let a = store.append_audit_event(event(10, 0x4154_0001)).unwrap();
    let b = store.append_audit_event(event(20, 0x4154_0015)).unwrap();
    assert!(a.0 < b.0);
    assert_eq!(store.audit_events().len(), 2);
    assert_eq!(store.audit_events()[0].audit_event_id, a);
    assert_eq!(store.audit_events()[1].audit_event_id, b);
}

#[test]
fn at_audit_db_02_session_records_are_insert_once() {
    let mut store = RollcallStore::new_in_memory();
    store.insert_session(session("s_1")).unwrap();
    assert!(store.lookup(&SessionId::new("s_1").unwrap()).is_some());
    assert!(store.lookup(&SessionId::new("s_2").unwrap()).is_none());

    let err = store.insert_session(session("s_1")).unwrap_err();
    assert!(matches!(err, StorageError::DuplicateKey { table: "sessions", .. }));
}

#[test]
fn at_audit_db_03_biometric_reference_is_write_once() {
    let mut store = RollcallStore::new_in_memory();
    let identity = IdentityId::new("21").unwrap();
    let reference = BiometricReference::v1(
        identity.clone(),
        FaceEmbedding::new(vec![0.125; FACE_EMBEDDING_DIM]).unwrap(),
    )
    .unwrap();

    store.register(reference.clone()).unwrap();
    assert_eq!(store.reference(&identity), Some(&reference));

    let err = store.register(reference).unwrap_err();
    assert!(matches!(
        err,
        StorageError::DuplicateKey { table: "biometric_refs", .. }
    ));
}

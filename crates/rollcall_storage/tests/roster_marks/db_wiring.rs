#![forbid(unsafe_code)]

use rollcall_contracts::common::DayKey;
use rollcall_contracts::roster::{DisplayName, IdentityId, RosterRow};
use rollcall_storage::store::{RosterAccessor, SessionScope, StorageError};

fn id(s: &str) -> IdentityId {
    IdentityId::new(s).unwrap()
}

fn row(identity: &str, name: &str) -> RosterRow {
    RosterRow::v1(id(identity), DisplayName::new(name).unwrap())
}

fn day(s: &str) -> DayKey {
    DayKey::new(s).unwrap()
}

#[test]
fn at_roster_db_01_mark_is_idempotent() {
    let mut scope = SessionScope::new(vec![row("21", "Asha"), row("22", "Ravi")]).unwrap();
    let d = day("2026-08-29");

    scope.mark(&id("21"), &d).unwrap();
    let after_first = scope.snapshot().to_vec();
    scope.mark(&id("21"), &d).unwrap();
    assert_eq!(scope.snapshot(), &after_first[..]);
    assert!(scope.snapshot()[0].is_present(&d));
    assert!(!scope.snapshot()[1].is_present(&d));
}

#[test]
fn at_roster_db_02_mark_unknown_identity_is_a_foreign_key_violation() {
    let mut scope = SessionScope::new(vec![row("21", "Asha")]).unwrap();
    let err = scope.mark(&id("99"), &day("2026-08-29")).unwrap_err();
    assert!(matches!(err, StorageError::ForeignKeyViolation { table: "roster", .. }));
}

#[test]
fn at_roster_db_03_duplicate_roster_identity_is_rejected() {
    let err = SessionScope::new(vec![row("21", "Asha"), row("21", "Asha B")]).unwrap_err();
    assert!(matches!(err, StorageError::DuplicateKey { table: "roster", .. }));
}

#[test]
fn at_roster_db_04_snapshot_preserves_upload_order() {
    let scope =
        SessionScope::new(vec![row("30", "Chitra"), row("21", "Asha"), row("22", "Ravi")])
            .unwrap();
    let ids: Vec<&str> = scope
        .snapshot()
        .iter()
        .map(|r| r.identity_id.as_str())
        .collect();
    assert_eq!(ids, vec!["30", "21", "22"]);
}

#[test]
fn at_roster_db_05_recompute_forces_unledgered_marks_to_zero() {
    let mut scope = SessionScope::new(vec![row("21", "Asha"), row("22", "Ravi")]).unwrap();
    let d = day("2026-08-29");

    // A mark written outside the commit path: present in the roster but
    // absent from the ledger.
    scope.mark(&id("22"), &d).unwrap();
    scope.recompute_day(&d);
    assert!(!scope.snapshot()[1].is_present(&d));

    // A committed mark survives recompute.
    scope.mark(&id("21"), &d).unwrap();
    scope
        .ledger_mut()
        .record(
            id("21"),
            rollcall_contracts::dedup::DeviceFingerprint::new("dev_a").unwrap(),
        )
        .unwrap();
    scope.recompute_day(&d);
    assert!(scope.snapshot()[0].is_present(&d));
}

#[test]
fn at_roster_db_06_day_sheet_renders_marks_and_escapes_fields() {
    let mut scope =
        SessionScope::new(vec![row("21", "Asha"), row("22", "Kumar, Ravi")]).unwrap();
    let d = day("2026-08-29");
    scope.mark(&id("21"), &d).unwrap();

    let csv = scope.day_sheet_csv(&d);
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "identity_id,display_name,2026-08-29");
    assert_eq!(lines[1], "21,Asha,1");
    assert_eq!(lines[2], "22,\"Kumar, Ravi\",0");
}

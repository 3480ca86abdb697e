#![forbid(unsafe_code)]

use rollcall_contracts::roster::{DisplayName, IdentityId, RosterRow};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityVerdict {
    /// Index of the matching row in the roster snapshot.
    Matched { row: usize },
    NotInRoster,
    NameMismatch,
}

/// Claim normalization: surrounding whitespace is noise, case is noise.
pub fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Validates the claimed (identity_id, display_name) pair jointly against a
/// roster snapshot. The pair check is intentional: matching each field
/// independently would let an attendee assemble another enrollee's roll/name
/// combination piecemeal.
///
/// `NotInRoster` when no row has the claimed id; `NameMismatch` when the row
/// exists but the normalized name differs. Both are terminal.
pub fn match_claim(
    rows: &[RosterRow],
    identity_id: &IdentityId,
    claimed_name: &DisplayName,
) -> IdentityVerdict {
    let want_id = normalize(identity_id.as_str());
    let want_name = normalize(claimed_name.as_str());

    for (row, candidate) in rows.iter().enumerate() {
        if normalize(candidate.identity_id.as_str()) == want_id {
            if normalize(candidate.display_name.as_str()) == want_name {
                return IdentityVerdict::Matched { row };
            }
            return IdentityVerdict::NameMismatch;
        }
    }
    IdentityVerdict::NotInRoster
}

#![forbid(unsafe_code)]

use crate::audit::{CorrelationId, TurnId};
use crate::common::DayKey;
use crate::dedup::DeviceFingerprint;
use crate::roster::{DisplayName, IdentityId};
use crate::session::SessionId;
use crate::{ContractViolation, MonotonicTimeNs, ReasonCodeId, SchemaVersion, Validate};

pub const VERIFY_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub mod reason_codes {
    use crate::ReasonCodeId;

    // Attendance verification reason-code namespace ("AT" = 0x4154).
    pub const VERIFY_OK_MARK_COMMITTED: ReasonCodeId = ReasonCodeId(0x4154_0001);
    pub const REGISTRY_OK_SESSION_CREATED: ReasonCodeId = ReasonCodeId(0x4154_0002);
    pub const BIOMETRIC_OK_REFERENCE_REGISTERED: ReasonCodeId = ReasonCodeId(0x4154_0003);
    pub const EXPORT_OK_DAY_SHEET: ReasonCodeId = ReasonCodeId(0x4154_0004);

    pub const VERIFY_FAIL_UNKNOWN_SESSION: ReasonCodeId = ReasonCodeId(0x4154_0010);
    pub const VERIFY_FAIL_INVALID_COORDINATE: ReasonCodeId = ReasonCodeId(0x4154_0011);
    pub const VERIFY_FAIL_OUT_OF_RANGE: ReasonCodeId = ReasonCodeId(0x4154_0012);
    pub const VERIFY_FAIL_NOT_IN_ROSTER: ReasonCodeId = ReasonCodeId(0x4154_0013);
    pub const VERIFY_FAIL_NAME_MISMATCH: ReasonCodeId = ReasonCodeId(0x4154_0014);
    pub const VERIFY_FAIL_ALREADY_MARKED: ReasonCodeId = ReasonCodeId(0x4154_0015);
    pub const VERIFY_FAIL_DEVICE_REUSED: ReasonCodeId = ReasonCodeId(0x4154_0016);
    pub const VERIFY_FAIL_UNDECODABLE_IMAGE: ReasonCodeId = ReasonCodeId(0x4154_0017);
    pub const VERIFY_FAIL_UNSUPPORTED_FORMAT: ReasonCodeId = ReasonCodeId(0x4154_0018);
    pub const VERIFY_FAIL_IMAGE_TOO_BLURRY: ReasonCodeId = ReasonCodeId(0x4154_0019);
    pub const VERIFY_FAIL_NO_FACE_DETECTED: ReasonCodeId = ReasonCodeId(0x4154_001A);
    pub const VERIFY_FAIL_FACE_MISMATCH: ReasonCodeId = ReasonCodeId(0x4154_001B);
    pub const VERIFY_FAIL_NOT_REGISTERED: ReasonCodeId = ReasonCodeId(0x4154_001C);
    pub const VERIFY_FAIL_WRITE_FAILED: ReasonCodeId = ReasonCodeId(0x4154_001D);
}

/// One submission into the verification pipeline. Ephemeral; consumed and
/// discarded within a single run.
///
/// The location fix is carried as raw degrees, not a validated `GeoPoint`:
/// a malformed fix must surface as the `InvalidCoordinate` rejection from
/// the pipeline, not as a request-construction error.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRequest {
    pub schema_version: SchemaVersion,
    pub correlation_id: CorrelationId,
    pub turn_id: TurnId,
    pub now: MonotonicTimeNs,
    pub day: DayKey,
    pub session_id: SessionId,
    pub identity_id: IdentityId,
    pub claimed_name: DisplayName,
    pub fix_lat_deg: f64,
    pub fix_lon_deg: f64,
    pub device_fingerprint: DeviceFingerprint,
    pub biometric_sample: Option<Vec<u8>>,
}

impl SubmissionRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        correlation_id: CorrelationId,
        turn_id: TurnId,
        now: MonotonicTimeNs,
        day: DayKey,
        session_id: SessionId,
        identity_id: IdentityId,
        claimed_name: DisplayName,
        fix_lat_deg: f64,
        fix_lon_deg: f64,
        device_fingerprint: DeviceFingerprint,
        biometric_sample: Option<Vec<u8>>,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: VERIFY_CONTRACT_VERSION,
            correlation_id,
            turn_id,
            now,
            day,
            session_id,
            identity_id,
            claimed_name,
            fix_lat_deg,
            fix_lon_deg,
            device_fingerprint,
            biometric_sample,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for SubmissionRequest {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != VERIFY_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "submission_request.schema_version",
                reason: "must match VERIFY_CONTRACT_VERSION",
            });
        }
        self.correlation_id.validate()?;
        self.turn_id.validate()?;
        self.day.validate()?;
        self.session_id.validate()?;
        self.identity_id.validate()?;
        self.claimed_name.validate()?;
        self.device_fingerprint.validate()?;
        if let Some(sample) = &self.biometric_sample {
            if sample.is_empty() {
                return Err(ContractViolation::InvalidValue {
                    field: "submission_request.biometric_sample",
                    reason: "must not be empty when provided",
                });
            }
        }
        Ok(())
    }
}

/// Rejection taxonomy. Every pipeline branch yields exactly one of
/// {accepted, one of these}; nothing is swallowed or retried.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    UnknownSession,
    InvalidCoordinate,
    OutOfRange { distance_m: f64 },
    NotInRoster,
    NameMismatch,
    AlreadyMarked,
    DeviceReused,
    UndecodableImage,
    UnsupportedFormat,
    ImageTooBlurry { score: f64 },
    NoFaceDetected,
    FaceMismatch { distance: f64 },
    NotRegistered,
    WriteFailed,
}

impl RejectReason {
    pub fn reason_code(&self) -> ReasonCodeId {
        match self {
            RejectReason::UnknownSession => reason_codes::VERIFY_FAIL_UNKNOWN_SESSION,
            RejectReason::InvalidCoordinate => reason_codes::VERIFY_FAIL_INVALID_COORDINATE,
            RejectReason::OutOfRange { .. } => reason_codes::VERIFY_FAIL_OUT_OF_RANGE,
            RejectReason::NotInRoster => reason_codes::VERIFY_FAIL_NOT_IN_ROSTER,
            RejectReason::NameMismatch => reason_codes::VERIFY_FAIL_NAME_MISMATCH,
            RejectReason::AlreadyMarked => reason_codes::VERIFY_FAIL_ALREADY_MARKED,
            RejectReason::DeviceReused => reason_codes::VERIFY_FAIL_DEVICE_REUSED,
            RejectReason::UndecodableImage => reason_codes::VERIFY_FAIL_UNDECODABLE_IMAGE,
            RejectReason::UnsupportedFormat => reason_codes::VERIFY_FAIL_UNSUPPORTED_FORMAT,
            RejectReason::ImageTooBlurry { .. } => reason_codes::VERIFY_FAIL_IMAGE_TOO_BLURRY,
            RejectReason::NoFaceDetected => reason_codes::VERIFY_FAIL_NO_FACE_DETECTED,
            RejectReason::FaceMismatch { .. } => reason_codes::VERIFY_FAIL_FACE_MISMATCH,
            RejectReason::NotRegistered => reason_codes::VERIFY_FAIL_NOT_REGISTERED,
            RejectReason::WriteFailed => reason_codes::VERIFY_FAIL_WRITE_FAILED,
        }
    }
}

impl Validate for RejectReason {
    fn validate(&self) -> Result<(), ContractViolation> {
        match self {
            RejectReason::OutOfRange { distance_m } => {
                if !distance_m.is_finite() || *distance_m < 0.0 {
                    return Err(ContractViolation::NotFinite {
                        field: "reject_reason.out_of_range.distance_m",
                    });
                }
            }
            RejectReason::ImageTooBlurry { score } => {
                if !score.is_finite() || *score < 0.0 {
                    return Err(ContractViolation::NotFinite {
                        field: "reject_reason.image_too_blurry.score",
                    });
                }
            }
            RejectReason::FaceMismatch { distance } => {
                if !distance.is_finite() || *distance < 0.0 {
                    return Err(ContractViolation::NotFinite {
                        field: "reject_reason.face_mismatch.distance",
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerifyAccepted {
    pub schema_version: SchemaVersion,
    pub identity_id: IdentityId,
    pub day: DayKey,
    pub distance_m: f64,
    pub biometric_distance: Option<f64>,
    pub reason_code: ReasonCodeId,
}

impl VerifyAccepted {
    pub fn v1(
        identity_id: IdentityId,
        day: DayKey,
        distance_m: f64,
        biometric_distance: Option<f64>,
    ) -> Result<Self, ContractViolation> {
        let a = Self {
            schema_version: VERIFY_CONTRACT_VERSION,
            identity_id,
            day,
            distance_m,
            biometric_distance,
            reason_code: reason_codes::VERIFY_OK_MARK_COMMITTED,
        };
        a.validate()?;
        Ok(a)
    }
}

impl Validate for VerifyAccepted {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != VERIFY_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "verify_accepted.schema_version",
                reason: "must match VERIFY_CONTRACT_VERSION",
            });
        }
        self.identity_id.validate()?;
        self.day.validate()?;
        if !self.distance_m.is_finite() || self.distance_m < 0.0 {
            return Err(ContractViolation::NotFinite {
                field: "verify_accepted.distance_m",
            });
        }
        if let Some(d) = self.biometric_distance {
            if !d.is_finite() || d < 0.0 {
                return Err(ContractViolation::NotFinite {
                    field: "verify_accepted.biometric_distance",
                });
            }
        }
        if self.reason_code.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "verify_accepted.reason_code",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerifyRejected {
    pub schema_version: SchemaVersion,
    pub reason: RejectReason,
    pub detail: String,
    pub reason_code: ReasonCodeId,
}

impl VerifyRejected {
    pub fn v1(reason: RejectReason, detail: impl Into<String>) -> Result<Self, ContractViolation> {
        let reason_code = reason.reason_code();
        let r = Self {
            schema_version: VERIFY_CONTRACT_VERSION,
            reason,
            detail: detail.into(),
            reason_code,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for VerifyRejected {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != VERIFY_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "verify_rejected.schema_version",
                reason: "must match VERIFY_CONTRACT_VERSION",
            });
        }
        self.reason.validate()?;
        if self.detail.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "verify_rejected.detail",
                reason: "must not be empty",
            });
        }
        if self.detail.len() > 512 {
            return Err(ContractViolation::InvalidValue {
                field: "verify_rejected.detail",
                reason: "must be <= 512 chars",
            });
        }
        if self.reason_code != self.reason.reason_code() {
            return Err(ContractViolation::InvalidValue {
                field: "verify_rejected.reason_code",
                reason: "must match the reason kind",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerifyResponse {
    Accepted(VerifyAccepted),
    Rejected(VerifyRejected),
}

impl Validate for VerifyResponse {
    fn validate(&self) -> Result<(), ContractViolation> {
        match self {
            VerifyResponse::Accepted(a) => a.validate(),
            VerifyResponse::Rejected(r) => r.validate(),
        }
    }
}

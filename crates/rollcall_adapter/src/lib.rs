#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;

use rollcall_contracts::audit::{CorrelationId, TurnId};
use rollcall_contracts::common::DayKey;
use rollcall_contracts::geo::{GeoPoint, RadiusM};
use rollcall_contracts::roster::{DisplayName, IdentityId, RosterRow};
use rollcall_contracts::session::{BiometricPolicy, SessionId};
use rollcall_contracts::verify::{SubmissionRequest, VerifyResponse};
use rollcall_contracts::{ContractViolation, MonotonicTimeNs};
use rollcall_core::verify::{RegisterResponse, VerifyConfig, VerifyService};
use rollcall_engines::biometric::LumaGridEmbedder;
use rollcall_engines::dedup::derive_fingerprint;
use rollcall_storage::store::StorageError;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RosterRowDto {
    pub identity_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CreateSessionAdapterRequest {
    pub lat: f64,
    pub lon: f64,
    pub radius_m: f64,
    pub require_face: bool,
    pub roster: Vec<RosterRowDto>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CreateSessionAdapterResponse {
    pub status: String,
    pub session_id: String,
    pub scan_path: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ScanAdapterResponse {
    pub status: String,
    pub session_id: String,
    pub require_face: bool,
    pub roster: Vec<RosterRowDto>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MarkAdapterRequest {
    pub session_id: String,
    pub identity_id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub device_token: String,
    pub day: Option<String>,
    pub face_image_b64: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MarkAdapterResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub reason_code: String,
    pub identity_id: Option<String>,
    pub day: Option<String>,
    pub distance_m: Option<f64>,
    pub biometric_distance: Option<f64>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RegisterFaceAdapterRequest {
    pub identity_id: String,
    pub face_image_b64: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RegisterFaceAdapterResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AdapterHealthResponse {
    pub status: String,
    pub outcome: String,
    pub audit_event_count: u64,
}

/// HTTP-facing wrapper around the verification service. Translates loose
/// wire types into validated contracts, derives the device fingerprint
/// from the caller's network origin plus its client-held token, and maps
/// engine outcomes back to transport DTOs.
pub struct AdapterRuntime {
    service: VerifyService,
}

impl Default for AdapterRuntime {
    fn default() -> Self {
        Self {
            service: VerifyService::new(VerifyConfig::mvp_v1(), Arc::new(LumaGridEmbedder)),
        }
    }
}

impl AdapterRuntime {
    pub fn new(service: VerifyService) -> Self {
        Self { service }
    }

    pub fn create_session(
        &self,
        request: CreateSessionAdapterRequest,
    ) -> Result<CreateSessionAdapterResponse, String> {
        let center = GeoPoint::new(request.lat, request.lon).map_err(contract_error_to_string)?;
        let radius_m = RadiusM::new(request.radius_m).map_err(contract_error_to_string)?;
        let policy = if request.require_face {
            BiometricPolicy::Required
        } else {
            BiometricPolicy::Disabled
        };
        let roster = request
            .roster
            .into_iter()
            .map(|row| {
                Ok(RosterRow::v1(
                    IdentityId::new(row.identity_id).map_err(contract_error_to_string)?,
                    DisplayName::new(row.display_name).map_err(contract_error_to_string)?,
                ))
            })
            .collect::<Result<Vec<_>, String>>()?;

        let (now, correlation_id, turn_id) = envelope_now();
        let record = self
            .service
            .create_session(now, correlation_id, turn_id, center, radius_m, policy, roster)
            .map_err(storage_error_to_string)?;
        Ok(CreateSessionAdapterResponse {
            status: "ok".to_string(),
            session_id: record.session_id.as_str().to_string(),
            scan_path: format!("/v1/session/{}/scan", record.session_id.as_str()),
        })
    }

    pub fn scan(&self, session_id: &str) -> Result<ScanAdapterResponse, String> {
        let session_id = SessionId::new(session_id).map_err(contract_error_to_string)?;
        let record = self
            .service
            .session(&session_id)
            .ok_or_else(|| "unknown session token".to_string())?;
        let roster = self
            .service
            .scan_snapshot(&session_id)
            .ok_or_else(|| "unknown session token".to_string())?
            .into_iter()
            .map(|(identity_id, display_name)| RosterRowDto {
                identity_id: identity_id.as_str().to_string(),
                display_name: display_name.as_str().to_string(),
            })
            .collect();
        Ok(ScanAdapterResponse {
            status: "ok".to_string(),
            session_id: session_id.as_str().to_string(),
            require_face: record.biometric_policy == BiometricPolicy::Required,
            roster,
        })
    }

    /// The attendance-marking path. `origin` is the caller's network
    /// address as seen by the transport; it never reaches the engine in
    /// raw form, only hashed into the fingerprint.
    pub fn mark_attendance(
        &self,
        origin: &str,
        request: MarkAdapterRequest,
    ) -> Result<MarkAdapterResponse, String> {
        let day = resolve_day(request.day.as_deref())?;
        let session_id = SessionId::new(request.session_id).map_err(contract_error_to_string)?;
        let identity_id = IdentityId::new(request.identity_id).map_err(contract_error_to_string)?;
        let claimed_name = DisplayName::new(request.name).map_err(contract_error_to_string)?;
        let fingerprint = derive_fingerprint(origin, &request.device_token)
            .map_err(contract_error_to_string)?;
        let sample = request
            .face_image_b64
            .as_deref()
            .map(decode_image_b64)
            .transpose()?;

        let (now, correlation_id, turn_id) = envelope_now();
        let submission = SubmissionRequest::v1(
            correlation_id,
            turn_id,
            now,
            day,
            session_id,
            identity_id,
            claimed_name,
            request.lat,
            request.lon,
            fingerprint,
            sample,
        )
        .map_err(contract_error_to_string)?;

        let response = self
            .service
            .submit(&submission)
            .map_err(storage_error_to_string)?;
        Ok(match response {
            VerifyResponse::Accepted(accepted) => MarkAdapterResponse {
                status: "ok".to_string(),
                outcome: "ACCEPTED".to_string(),
                reason: None,
                reason_code: accepted.reason_code.0.to_string(),
                identity_id: Some(accepted.identity_id.as_str().to_string()),
                day: Some(accepted.day.as_str().to_string()),
                distance_m: Some(accepted.distance_m),
                biometric_distance: accepted.biometric_distance,
            },
            VerifyResponse::Rejected(rejected) => MarkAdapterResponse {
                status: "ok".to_string(),
                outcome: "REJECTED".to_string(),
                reason: Some(rejected.detail),
                reason_code: rejected.reason_code.0.to_string(),
                identity_id: None,
                day: None,
                distance_m: None,
                biometric_distance: None,
            },
        })
    }

    pub fn register_face(
        &self,
        request: RegisterFaceAdapterRequest,
    ) -> Result<RegisterFaceAdapterResponse, String> {
        let identity_id = IdentityId::new(request.identity_id).map_err(contract_error_to_string)?;
        let image = decode_image_b64(&request.face_image_b64)?;
        let (now, correlation_id, turn_id) = envelope_now();
        match self
            .service
            .register_reference(now, correlation_id, turn_id, identity_id, &image)
        {
            Ok(RegisterResponse::Registered { identity_id }) => Ok(RegisterFaceAdapterResponse {
                status: "ok".to_string(),
                outcome: "REGISTERED".to_string(),
                reason: Some(format!("reference stored for {}", identity_id.as_str())),
            }),
            Ok(RegisterResponse::Rejected(rejected)) => Ok(RegisterFaceAdapterResponse {
                status: "ok".to_string(),
                outcome: "REJECTED".to_string(),
                reason: Some(rejected.detail),
            }),
            Err(StorageError::DuplicateKey { .. }) => Ok(RegisterFaceAdapterResponse {
                status: "ok".to_string(),
                outcome: "REJECTED".to_string(),
                reason: Some("a reference is already registered for this identity".to_string()),
            }),
            Err(err) => Err(storage_error_to_string(err)),
        }
    }

    /// Download path: the recomputed one-day CSV sheet.
    pub fn day_sheet_csv(&self, session_id: &str, day: Option<&str>) -> Result<String, String> {
        let session_id = SessionId::new(session_id).map_err(contract_error_to_string)?;
        let day = resolve_day(day)?;
        let (now, correlation_id, turn_id) = envelope_now();
        self.service
            .day_sheet(now, correlation_id, turn_id, &session_id, &day)
            .map_err(storage_error_to_string)
    }

    pub fn health_report(&self) -> AdapterHealthResponse {
        AdapterHealthResponse {
            status: "ok".to_string(),
            outcome: "HEALTHY".to_string(),
            audit_event_count: self.service.audit_events().len() as u64,
        }
    }
}

fn resolve_day(day: Option<&str>) -> Result<DayKey, String> {
    let day = match day {
        Some(day) => day.to_string(),
        None => chrono::Utc::now().format("%Y-%m-%d").to_string(),
    };
    DayKey::new(day).map_err(contract_error_to_string)
}

fn decode_image_b64(encoded: &str) -> Result<Vec<u8>, String> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|_| "face_image_b64 is not valid base64".to_string())
}

fn envelope_now() -> (MonotonicTimeNs, CorrelationId, TurnId) {
    let now_ns = system_time_now_ns().max(1);
    (
        MonotonicTimeNs(now_ns),
        CorrelationId(u128::from(now_ns)),
        TurnId(now_ns),
    )
}

fn system_time_now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos().min(u128::from(u64::MAX)) as u64)
        .unwrap_or(1)
}

fn contract_error_to_string(err: ContractViolation) -> String {
    format!("invalid request: {err:?}")
}

fn storage_error_to_string(err: StorageError) -> String {
    match err {
        StorageError::ForeignKeyViolation { table, key } => {
            format!("foreign key violation in {table}: {key}")
        }
        StorageError::DuplicateKey { table, key } => {
            format!("duplicate key in {table}: {key}")
        }
        StorageError::AppendOnlyViolation { table } => {
            format!("append-only violation in {table}")
        }
        StorageError::ContractViolation(v) => format!("contract violation: {v:?}"),
    }
}

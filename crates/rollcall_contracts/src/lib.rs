#![forbid(unsafe_code)]

pub mod audit;
pub mod biometric;
pub mod common;
pub mod dedup;
pub mod geo;
pub mod roster;
pub mod session;
pub mod verify;

pub use common::{
    ContractViolation, DayKey, MonotonicTimeNs, ReasonCodeId, SchemaVersion, Validate,
};

#![forbid(unsafe_code)]

pub mod biometric;
pub mod dedup;
pub mod geofence;
pub mod identity;

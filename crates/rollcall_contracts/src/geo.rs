#![forbid(unsafe_code)]

use crate::{ContractViolation, Validate};

/// WGS84 point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat_deg: f64,
    pub lon_deg: f64,
}

impl GeoPoint {
    pub fn new(lat_deg: f64, lon_deg: f64) -> Result<Self, ContractViolation> {
        let p = Self { lat_deg, lon_deg };
        p.validate()?;
        Ok(p)
    }
}

impl Validate for GeoPoint {
    fn validate(&self) -> Result<(), ContractViolation> {
        if !self.lat_deg.is_finite() {
            return Err(ContractViolation::NotFinite {
                field: "geo_point.lat_deg",
            });
        }
        if !self.lon_deg.is_finite() {
            return Err(ContractViolation::NotFinite {
                field: "geo_point.lon_deg",
            });
        }
        if self.lat_deg < -90.0 || self.lat_deg > 90.0 {
            return Err(ContractViolation::InvalidRange {
                field: "geo_point.lat_deg",
                min: -90.0,
                max: 90.0,
                got: self.lat_deg,
            });
        }
        if self.lon_deg < -180.0 || self.lon_deg > 180.0 {
            return Err(ContractViolation::InvalidRange {
                field: "geo_point.lon_deg",
                min: -180.0,
                max: 180.0,
                got: self.lon_deg,
            });
        }
        Ok(())
    }
}

/// Geofence radius in meters. Positive and finite; practical sessions use
/// radii up to a few kilometers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusM(f64);

impl RadiusM {
    pub fn new(meters: f64) -> Result<Self, ContractViolation> {
        let r = Self(meters);
        r.validate()?;
        Ok(r)
    }

    pub fn meters(&self) -> f64 {
        self.0
    }
}

impl Validate for RadiusM {
    fn validate(&self) -> Result<(), ContractViolation> {
        if !self.0.is_finite() {
            return Err(ContractViolation::NotFinite { field: "radius_m" });
        }
        if self.0 <= 0.0 {
            return Err(ContractViolation::InvalidValue {
                field: "radius_m",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

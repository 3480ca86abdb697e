#![forbid(unsafe_code)]

use rollcall_contracts::geo::{GeoPoint, RadiusM};

/// Mean Earth radius in meters, matching the haversine sphere model.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeofenceVerdict {
    Within { distance_m: f64 },
    Outside { distance_m: f64 },
}

impl GeofenceVerdict {
    pub fn distance_m(&self) -> f64 {
        match self {
            GeofenceVerdict::Within { distance_m } | GeofenceVerdict::Outside { distance_m } => {
                *distance_m
            }
        }
    }
}

/// Great-circle distance between two validated points, haversine formula.
/// Pure and deterministic; antipodal precision is irrelevant at geofence
/// scale (radii of a few kilometers at most).
pub fn distance_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let phi1 = a.lat_deg.to_radians();
    let phi2 = b.lat_deg.to_radians();
    let d_phi = (b.lat_deg - a.lat_deg).to_radians();
    let d_lambda = (b.lon_deg - a.lon_deg).to_radians();

    let h = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Containment: within iff distance <= radius. The boundary is inclusive.
pub fn check(center: &GeoPoint, radius: &RadiusM, point: &GeoPoint) -> GeofenceVerdict {
    let distance_m = distance_m(center, point);
    if distance_m <= radius.meters() {
        GeofenceVerdict::Within { distance_m }
    } else {
        GeofenceVerdict::Outside { distance_m }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    #[test]
    fn nearby_fix_is_within_a_50m_fence() {
        let center = p(12.9716, 77.5946);
        let fix = p(12.9716, 77.5950);
        let d = distance_m(&center, &fix);
        assert!(d > 35.0 && d < 50.0, "distance was {d}");
        assert!(matches!(
            check(&center, &RadiusM::new(50.0).unwrap(), &fix),
            GeofenceVerdict::Within { .. }
        ));
    }

    #[test]
    fn distant_fix_is_outside_and_reports_distance() {
        let center = p(12.9716, 77.5946);
        let fix = p(12.9730, 77.5946);
        let d = distance_m(&center, &fix);
        assert!(d > 150.0 && d < 160.0, "distance was {d}");
        match check(&center, &RadiusM::new(50.0).unwrap(), &fix) {
            GeofenceVerdict::Outside { distance_m } => assert!((distance_m - d).abs() < 1e-9),
            other => panic!("expected Outside, got {other:?}"),
        }
    }

    #[test]
    fn distance_is_symmetric() {
        let a = p(12.9716, 77.5946);
        let b = p(12.9730, 77.5950);
        assert!((distance_m(&a, &b) - distance_m(&b, &a)).abs() < 1e-9);
    }

    #[test]
    fn zero_distance_at_identical_points() {
        let a = p(0.0, 0.0);
        assert_eq!(distance_m(&a, &a), 0.0);
        assert!(matches!(
            check(&a, &RadiusM::new(10.0).unwrap(), &a),
            GeofenceVerdict::Within { distance_m } if distance_m == 0.0
        ));
    }

    #[test]
    fn growing_the_radius_never_flips_within_to_outside() {
        let center = p(12.9716, 77.5946);
        let fix = p(12.9716, 77.5950);
        let mut radius = 1.0;
        let mut was_within = false;
        while radius <= 1024.0 {
            let within = matches!(
                check(&center, &RadiusM::new(radius).unwrap(), &fix),
                GeofenceVerdict::Within { .. }
            );
            assert!(!was_within || within, "radius {radius} flipped within -> outside");
            was_within = within;
            radius *= 2.0;
        }
        assert!(was_within);
    }
}

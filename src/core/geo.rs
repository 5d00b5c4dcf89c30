//! Geodesy helpers over (lon, lat) coordinate pairs
//!
//! Great-circle distance, initial bearing and cardinal-direction naming on a
//! spherical Earth model. Good enough for urban transit geometry; not an
//! ellipsoidal implementation.

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Coarse planar-degrees-to-meters factor, valid near the equator and for
/// short lateral offsets
pub const METERS_PER_DEGREE: f64 = 111_000.0;

/// A WGS84 position as an ordered (lon, lat) pair in degrees.
///
/// Serializes to the `[lon, lat]` array form used by GeoJSON and every
/// persisted artifact. Equality is exact bitwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord(pub f64, pub f64);

impl Coord {
    pub fn new(lon: f64, lat: f64) -> Self {
        Coord(lon, lat)
    }

    pub fn lon(&self) -> f64 {
        self.0
    }

    pub fn lat(&self) -> f64 {
        self.1
    }

    /// Checks finiteness and the WGS84 ranges.
    pub fn validate(&self) -> Result<()> {
        if !self.0.is_finite() || !self.1.is_finite() {
            return Err(Error::BadCoordinate(format!(
                "non-finite coordinate ({}, {})",
                self.0, self.1
            )));
        }
        if !(-180.0..=180.0).contains(&self.0) || !(-90.0..=90.0).contains(&self.1) {
            return Err(Error::BadCoordinate(format!(
                "coordinate out of range (lon={}, lat={})",
                self.0, self.1
            )));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Great-circle distance between two points in meters.
///
/// Symmetric and non-negative. Fails with `BadCoordinate` on non-finite or
/// out-of-range input.
pub fn haversine(a: Coord, b: Coord) -> Result<f64> {
    a.validate()?;
    b.validate()?;

    let lat1 = a.lat().to_radians();
    let lat2 = b.lat().to_radians();
    let dlat = (b.lat() - a.lat()).to_radians();
    let dlon = (b.lon() - a.lon()).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().asin();

    Ok(c * EARTH_RADIUS_M)
}

/// Initial bearing from `a` to `b` in degrees, normalized to [0, 360).
///
/// 0 is north, 90 is east. Undefined for identical points, which fail with
/// `DegenerateSegment`.
pub fn initial_bearing(a: Coord, b: Coord) -> Result<f64> {
    a.validate()?;
    b.validate()?;
    if a == b {
        return Err(Error::DegenerateSegment(format!(
            "bearing undefined for identical points ({}, {})",
            a.lon(),
            a.lat()
        )));
    }

    let lat1 = a.lat().to_radians();
    let lat2 = b.lat().to_radians();
    let dlon = (b.lon() - a.lon()).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    let bearing = y.atan2(x).to_degrees();

    Ok((bearing + 360.0) % 360.0)
}

/// The eight compass labels, bucketed every 45 degrees.
pub fn cardinal(bearing: f64) -> &'static str {
    const NAMES: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];
    let index = ((bearing / 45.0).round() as usize) % 8;
    NAMES[index]
}

/// Rounds to the nearest multiple of ten, for user-visible distance text.
pub fn round_to_tens(value: f64) -> i64 {
    ((value / 10.0).round() * 10.0) as i64
}

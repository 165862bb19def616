//! Web Mercator normalization between latitude/longitude and the unit plane.
//!
//! Latitudes between the Mercator limit (±85.05112878°) and the poles are
//! clamped to the limit before projecting. Anything outside [-90, 90] /
//! [-180, 180], or not finite, is rejected.

use std::f64::consts::PI;

use super::error::ProjectionError;
use super::types::{GeoPoint, PlanePoint, TileCoord, MAX_MERCATOR_LAT, MIN_MERCATOR_LAT};

/// Projects a geographic coordinate onto the normalized plane.
///
/// `x = (lon + 180) / 360`, `y = (1 - ln(tan(π/4 + φ/2)) / π) / 2`.
pub fn to_plane(lat: f64, lon: f64) -> Result<PlanePoint, ProjectionError> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(ProjectionError::out_of_range("latitude", lat));
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(ProjectionError::out_of_range("longitude", lon));
    }

    let lat = lat.clamp(MIN_MERCATOR_LAT, MAX_MERCATOR_LAT);
    let lat_rad = lat * PI / 180.0;

    let x = (lon + 180.0) / 360.0;
    let mercator_y = (PI / 4.0 + lat_rad / 2.0).tan().ln();
    // rounding at the clamp limit lands a hair outside the unit square
    let y = ((1.0 - mercator_y / PI) / 2.0).clamp(0.0, 1.0);

    Ok(PlanePoint { x, y })
}

/// Inverse of [`to_plane`].
pub fn from_plane(point: PlanePoint) -> Result<GeoPoint, ProjectionError> {
    if !point.x.is_finite() || !(0.0..=1.0).contains(&point.x) {
        return Err(ProjectionError::out_of_range("x", point.x));
    }
    if !point.y.is_finite() || !(0.0..=1.0).contains(&point.y) {
        return Err(ProjectionError::out_of_range("y", point.y));
    }

    let longitude = point.x * 360.0 - 180.0;
    let lat_rad = (PI * (1.0 - 2.0 * point.y)).sinh().atan();

    Ok(GeoPoint {
        latitude: lat_rad * 180.0 / PI,
        longitude,
    })
}

/// Pixel span of the whole plane at `level`: `tile_size * 2^level`.
pub fn tile_span_at_level(level: u32, tile_size: u32) -> Result<u64, ProjectionError> {
    2u64.checked_pow(level)
        .and_then(|tiles| tiles.checked_mul(u64::from(tile_size)))
        .ok_or(ProjectionError::LevelOutOfRange { level, tile_size })
}

/// Tile of the pyramid at `level` that contains `point`.
pub fn tile_at(point: PlanePoint, level: u32) -> Result<TileCoord, ProjectionError> {
    if !(0.0..=1.0).contains(&point.x) {
        return Err(ProjectionError::out_of_range("x", point.x));
    }
    if !(0.0..=1.0).contains(&point.y) {
        return Err(ProjectionError::out_of_range("y", point.y));
    }
    let n = 2u64
        .checked_pow(level)
        .filter(|_| level <= 52)
        .ok_or(ProjectionError::LevelOutOfRange { level, tile_size: 1 })?;

    let last = n - 1;
    let col = ((point.x * n as f64) as u64).min(last);
    let row = ((point.y * n as f64) as u64).min(last);

    Ok(TileCoord { level, col, row })
}

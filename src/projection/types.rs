use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Web Mercator latitude limit. Beyond it the projection diverges.
pub const MAX_MERCATOR_LAT: f64 = 85.05112878;
pub const MIN_MERCATOR_LAT: f64 = -MAX_MERCATOR_LAT;

/// Normalized map-plane coordinate. Both axes lie in [0, 1], `y` grows southwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PlanePoint {
    pub x: f64,
    pub y: f64,
}

impl PlanePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// A tile in the pyramid at a given level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
pub struct TileCoord {
    pub level: u32,
    /// X index, 0 at the antimeridian (west)
    pub col: u64,
    /// Y index, 0 at the north edge
    pub row: u64,
}

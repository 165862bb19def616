use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::error::ProjectionError;
use super::mercator::{tile_span_at_level, to_plane};
use super::path::center_of;
use super::types::PlanePoint;

/// Zoom range of the tile pyramid the display works with.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct MapLevels {
    #[serde(default = "default_min_level")]
    pub min_level: u32,
    #[serde(default = "default_max_level")]
    pub max_level: u32,
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
}

fn default_min_level() -> u32 {
    12
}

fn default_max_level() -> u32 {
    16
}

fn default_tile_size() -> u32 {
    256
}

impl Default for MapLevels {
    fn default() -> Self {
        Self {
            min_level: default_min_level(),
            max_level: default_max_level(),
            tile_size: default_tile_size(),
        }
    }
}

impl MapLevels {
    /// Pixel width (and height) of the plane at the deepest level.
    pub fn full_size(&self) -> Result<u64, ProjectionError> {
        tile_span_at_level(self.max_level, self.tile_size)
    }

    /// Scale at which the plane is shown at `min_level`, relative to `max_level`.
    pub fn minimum_scale(&self) -> f64 {
        let steps = self.max_level.saturating_sub(self.min_level);
        1.0 / 2f64.powi(steps as i32)
    }
}

/// What the display should show: a plane position and a zoom scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct Viewport {
    pub center: PlanePoint,
    pub scale: f64,
}

impl Viewport {
    pub fn at(center: PlanePoint, scale: f64) -> Self {
        Self { center, scale }
    }

    /// Full-detail view on a live fix.
    pub fn for_fix(lat: f64, lon: f64) -> Result<Self, ProjectionError> {
        Ok(Self::at(to_plane(lat, lon)?, 1.0))
    }

    /// Overview of a historical path, centered on its points.
    pub fn for_path(points: &[PlanePoint], levels: &MapLevels) -> Option<Self> {
        center_of(points).map(|center| Self::at(center, levels.minimum_scale()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_levels() {
        let levels = MapLevels::default();
        assert_eq!(levels.full_size().unwrap(), 256 * 65_536);
        assert_eq!(levels.minimum_scale(), 1.0 / 16.0);
    }

    #[test]
    fn test_path_viewport_uses_center() {
        let points = [PlanePoint::new(0.2, 0.4), PlanePoint::new(0.4, 0.6)];
        let viewport = Viewport::for_path(&points, &MapLevels::default()).unwrap();
        assert!((viewport.center.x - 0.3).abs() < 1e-12);
        assert!((viewport.center.y - 0.5).abs() < 1e-12);
        assert_eq!(viewport.scale, 1.0 / 16.0);

        assert!(Viewport::for_path(&[], &MapLevels::default()).is_none());
    }

    #[test]
    fn test_fix_viewport() {
        let viewport = Viewport::for_fix(0.0, 0.0).unwrap();
        assert_eq!(viewport.center, PlanePoint::new(0.5, 0.5));
        assert_eq!(viewport.scale, 1.0);
        assert!(Viewport::for_fix(91.0, 0.0).is_err());
    }
}

use super::error::ProjectionError;
use super::mercator::to_plane;
use super::types::PlanePoint;
use crate::store::LocationRecord;

/// Projects records onto the plane, keeping the order they were given in.
pub fn build_path(records: &[LocationRecord]) -> Result<Vec<PlanePoint>, ProjectionError> {
    records
        .iter()
        .map(|r| to_plane(r.latitude, r.longitude))
        .collect()
}

/// Per-axis mean of `points`, `None` when there are none.
pub fn center_of(points: &[PlanePoint]) -> Option<PlanePoint> {
    match points {
        [] => None,
        [only] => Some(*only),
        _ => {
            let n = points.len() as f64;
            let (sum_x, sum_y) = points
                .iter()
                .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
            Some(PlanePoint::new(sum_x / n, sum_y / n))
        }
    }
}

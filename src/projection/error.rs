use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    #[error("coordinate out of range: {axis} = {value}")]
    CoordinateOutOfRange { axis: &'static str, value: f64 },
    #[error("pyramid level {level} overflows with tile size {tile_size}")]
    LevelOutOfRange { level: u32, tile_size: u32 },
}

impl ProjectionError {
    pub(crate) fn out_of_range(axis: &'static str, value: f64) -> Self {
        ProjectionError::CoordinateOutOfRange { axis, value }
    }
}

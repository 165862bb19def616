mod error;
mod mercator;
mod path;
mod types;
mod viewport;

pub use error::ProjectionError;
pub use mercator::{from_plane, tile_at, to_plane};
pub use path::{build_path, center_of};
pub use types::{GeoPoint, PlanePoint, TileCoord, MAX_MERCATOR_LAT};
pub use viewport::{MapLevels, Viewport};

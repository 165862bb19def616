use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::projection::{
    build_path, center_of, from_plane, tile_at, to_plane, GeoPoint, PlanePoint, TileCoord, Viewport,
};
use crate::store::SortDirection;
use crate::web::api::error::{ApiResult, ErrorResponse};
use crate::web::api::with_store;
use crate::web::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct PathQuery {
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PathResponse {
    /// Plane points in chronological order, first is the start of the path
    pub points: Vec<PlanePoint>,
    pub center: Option<PlanePoint>,
    /// `center` mapped back to degrees
    pub center_location: Option<GeoPoint>,
    pub viewport: Option<Viewport>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProjectionQuery {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectionResponse {
    pub point: PlanePoint,
    /// Tile at the deepest configured level
    pub tile: TileCoord,
}

#[utoipa::path(
    get,
    path = "/api/path",
    tag = "projection",
    params(
        ("owner" = Option<String>, Query, description = "Only records with this owner tag")
    ),
    responses(
        (status = 200, description = "Projected path with its center and viewport", body = PathResponse),
        (status = 400, description = "A stored coordinate cannot be projected", body = ErrorResponse),
        (status = 503, description = "Storage unavailable", body = ErrorResponse)
    )
)]
pub async fn path(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> ApiResult<Json<PathResponse>> {
    let records = match query.owner {
        Some(owner) => {
            with_store(&state.store, move |s| s.query_by_owner(&owner, SortDirection::Asc)).await?
        }
        None => with_store(&state.store, |s| s.query_all(SortDirection::Asc)).await?,
    };

    let points = build_path(&records)?;
    let center = center_of(&points);
    let center_location = center.map(from_plane).transpose()?;
    let viewport = Viewport::for_path(&points, &state.config.map);
    log::debug!("Projected path of {} points", points.len());

    Ok(Json(PathResponse {
        points,
        center,
        center_location,
        viewport,
    }))
}

#[utoipa::path(
    get,
    path = "/api/projection",
    tag = "projection",
    params(
        ("lat" = f64, Query, description = "Latitude in degrees"),
        ("lon" = f64, Query, description = "Longitude in degrees")
    ),
    responses(
        (status = 200, description = "Plane coordinate of the point", body = ProjectionResponse),
        (status = 400, description = "Coordinate out of range", body = ErrorResponse)
    )
)]
pub async fn projection(
    State(state): State<AppState>,
    Query(query): Query<ProjectionQuery>,
) -> ApiResult<Json<ProjectionResponse>> {
    let point = to_plane(query.lat, query.lon)?;
    let tile = tile_at(point, state.config.map.max_level)?;
    Ok(Json(ProjectionResponse { point, tile }))
}

use utoipa::OpenApi;

use super::api::error::ErrorResponse;
use super::api::locations::{CountResponse, DeleteResponse};
use super::api::path::{PathResponse, ProjectionResponse};
use super::api::source::{AuthorizationRequest, AuthorizationResponse, PushResponse};

#[derive(OpenApi)]
#[openapi(
    paths(
        super::api::tracker::start,
        super::api::tracker::stop,
        super::api::tracker::status,
        super::api::tracker::events,
        super::api::locations::list,
        super::api::locations::recent,
        super::api::locations::count,
        super::api::locations::insert,
        super::api::locations::seed,
        super::api::locations::delete,
        super::api::locations::stream,
        super::api::path::path,
        super::api::path::projection,
        super::api::source::current_fix,
        super::api::source::set_authorization,
        super::api::source::push_fix,
        super::api::source::disable,
        super::api::source::enable,
    ),
    components(
        schemas(
            ErrorResponse,
            CountResponse,
            DeleteResponse,
            PathResponse,
            ProjectionResponse,
            AuthorizationRequest,
            AuthorizationResponse,
            PushResponse,
            crate::store::LocationRecord,
            crate::store::NewLocation,
            crate::store::SortDirection,
            crate::tracker::TrackerMode,
            crate::tracker::TrackerStatus,
            crate::tracker::TrackerEvent,
            crate::source::Fix,
            crate::source::Authorization,
            crate::source::PushOutcome,
            crate::projection::PlanePoint,
            crate::projection::GeoPoint,
            crate::projection::TileCoord,
            crate::projection::Viewport,
        )
    ),
    info(
        title = "Track-O-Mat API",
        description = "Location tracking, history and map projection",
        version = "0.1.0"
    ),
    tags(
        (name = "tracker", description = "Live tracking control"),
        (name = "locations", description = "Stored location history"),
        (name = "projection", description = "Map plane projection"),
        (name = "source", description = "Position provider controls")
    )
)]
pub struct ApiDoc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use chrono::Utc;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::store::{demo_records, LocationRecord, NewLocation, SortDirection};
use crate::web::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::web::api::with_store;
use crate::web::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQuery {
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub order: Option<SortDirection>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecentQuery {
    pub n: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteQuery {
    /// Only delete records with a timestamp before this (ms)
    #[serde(default)]
    pub before: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StreamQuery {
    #[serde(default)]
    pub order: Option<SortDirection>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteResponse {
    pub deleted: usize,
}

#[utoipa::path(
    get,
    path = "/api/locations",
    tag = "locations",
    params(
        ("owner" = Option<String>, Query, description = "Only records with this owner tag"),
        ("order" = Option<SortDirection>, Query, description = "Timestamp order, asc by default")
    ),
    responses(
        (status = 200, description = "Records ordered by timestamp", body = Vec<LocationRecord>),
        (status = 503, description = "Storage unavailable", body = ErrorResponse)
    )
)]
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<LocationRecord>>> {
    let direction = query.order.unwrap_or_default();
    let records = match query.owner {
        Some(owner) => {
            with_store(&state.store, move |s| s.query_by_owner(&owner, direction)).await?
        }
        None => with_store(&state.store, move |s| s.query_all(direction)).await?,
    };
    Ok(Json(records))
}

#[utoipa::path(
    get,
    path = "/api/locations/recent",
    tag = "locations",
    params(
        ("n" = i64, Query, description = "How many records, newest first")
    ),
    responses(
        (status = 200, description = "Most recent records", body = Vec<LocationRecord>),
        (status = 503, description = "Storage unavailable", body = ErrorResponse)
    )
)]
pub async fn recent(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> ApiResult<Json<Vec<LocationRecord>>> {
    let records = with_store(&state.store, move |s| s.query_recent(query.n)).await?;
    Ok(Json(records))
}

#[utoipa::path(
    get,
    path = "/api/locations/count",
    tag = "locations",
    responses(
        (status = 200, description = "Number of stored records", body = CountResponse),
        (status = 503, description = "Storage unavailable", body = ErrorResponse)
    )
)]
pub async fn count(State(state): State<AppState>) -> ApiResult<Json<CountResponse>> {
    let count = with_store(&state.store, |s| s.count()).await?;
    Ok(Json(CountResponse { count }))
}

#[utoipa::path(
    post,
    path = "/api/locations",
    tag = "locations",
    request_body = Vec<NewLocation>,
    responses(
        (status = 201, description = "All records stored", body = Vec<LocationRecord>),
        (status = 400, description = "A record was invalid, nothing stored", body = ErrorResponse),
        (status = 503, description = "Storage unavailable", body = ErrorResponse)
    )
)]
pub async fn insert(
    State(state): State<AppState>,
    Json(batch): Json<Vec<NewLocation>>,
) -> ApiResult<impl IntoResponse> {
    if batch.is_empty() {
        return Err(ApiError::Validation("empty batch".into()));
    }
    let records = with_store(&state.store, move |s| s.insert_many(batch)).await?;
    Ok((StatusCode::CREATED, Json(records)))
}

#[utoipa::path(
    post,
    path = "/api/locations/seed",
    tag = "locations",
    responses(
        (status = 201, description = "Demo track stored", body = Vec<LocationRecord>),
        (status = 503, description = "Storage unavailable", body = ErrorResponse)
    )
)]
pub async fn seed(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let batch = demo_records(Utc::now().timestamp_millis());
    let records = with_store(&state.store, move |s| s.insert_many(batch)).await?;
    log::info!("Seeded {} demo locations", records.len());
    Ok((StatusCode::CREATED, Json(records)))
}

#[utoipa::path(
    delete,
    path = "/api/locations",
    tag = "locations",
    params(
        ("before" = Option<i64>, Query, description = "Only delete records older than this timestamp (ms)")
    ),
    responses(
        (status = 200, description = "Records deleted", body = DeleteResponse),
        (status = 503, description = "Storage unavailable", body = ErrorResponse)
    )
)]
pub async fn delete(
    State(state): State<AppState>,
    Query(query): Query<DeleteQuery>,
) -> ApiResult<Json<DeleteResponse>> {
    let deleted = match query.before {
        Some(threshold) => {
            with_store(&state.store, move |s| s.delete_older_than(threshold)).await?
        }
        None => with_store(&state.store, |s| s.delete_all()).await?,
    };
    Ok(Json(DeleteResponse { deleted }))
}

#[utoipa::path(
    get,
    path = "/api/locations/stream",
    tag = "locations",
    params(
        ("order" = Option<SortDirection>, Query, description = "Timestamp order of each snapshot")
    ),
    responses(
        (status = 200, description = "Server-sent `snapshot` events with the full ordered record set", content_type = "text/event-stream")
    )
)]
pub async fn stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let snapshots = state.store.subscribe(query.order.unwrap_or_default());

    let events = snapshots.map(|snapshot| match snapshot {
        Ok(records) => Event::default().event("snapshot").json_data(&records),
        Err(e) => Ok(Event::default().event("error").data(e.to_string())),
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

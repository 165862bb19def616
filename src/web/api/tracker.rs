use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;

use crate::tracker::{Command, TrackerMode, TrackerStatus};
use crate::web::api::error::{ApiResult, ErrorResponse};
use crate::web::state::AppState;

#[utoipa::path(
    post,
    path = "/api/tracker/start",
    responses(
        (status = 200, description = "Tracking (already running is not an error)", body = TrackerMode),
        (status = 403, description = "Location permission not granted", body = ErrorResponse),
        (status = 503, description = "Position provider unavailable", body = ErrorResponse)
    ),
    tag = "tracker"
)]
pub async fn start(State(state): State<AppState>) -> ApiResult<Json<TrackerMode>> {
    let mut tracker = state.tracker.lock().await;
    let mode = tracker.execute(Command::Start).await?;
    Ok(Json(mode))
}

#[utoipa::path(
    post,
    path = "/api/tracker/stop",
    responses(
        (status = 200, description = "Tracker stopped (stopping while idle is a no-op)", body = TrackerMode)
    ),
    tag = "tracker"
)]
pub async fn stop(State(state): State<AppState>) -> ApiResult<Json<TrackerMode>> {
    let mut tracker = state.tracker.lock().await;
    let mode = tracker.execute(Command::Stop).await?;
    Ok(Json(mode))
}

#[utoipa::path(
    get,
    path = "/api/tracker/status",
    responses(
        (status = 200, description = "Tracker status", body = TrackerStatus)
    ),
    tag = "tracker"
)]
pub async fn status(State(state): State<AppState>) -> ApiResult<Json<TrackerStatus>> {
    let tracker = state.tracker.lock().await;
    Ok(Json(tracker.status()))
}

#[utoipa::path(
    get,
    path = "/api/tracker/events",
    responses(
        (status = 200, description = "Server-sent tracker events", content_type = "text/event-stream")
    ),
    tag = "tracker"
)]
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let rx = state.tracker.lock().await.subscribe_events();

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let sse = Event::default().event("tracker").json_data(&event);
                    return Some((sse, rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Tracker event stream lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

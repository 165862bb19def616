use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::projection::ProjectionError;
use crate::source::SourceError;
use crate::store::StoreError;
use crate::tracker::TrackerError;

#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    Conflict(&'static str),
    Store(StoreError),
    Tracker(TrackerError),
    Source(SourceError),
    Projection(ProjectionError),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl From<TrackerError> for ApiError {
    fn from(e: TrackerError) -> Self {
        ApiError::Tracker(e)
    }
}

impl From<SourceError> for ApiError {
    fn from(e: SourceError) -> Self {
        ApiError::Source(e)
    }
}

impl From<ProjectionError> for ApiError {
    fn from(e: ProjectionError) -> Self {
        ApiError::Projection(e)
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, Option<String>) {
        match self {
            ApiError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "validation_failed", Some(msg.clone()))
            }
            ApiError::Conflict(reason) => (StatusCode::CONFLICT, *reason, None),
            ApiError::Store(e @ StoreError::InvalidRecord(_)) => {
                (StatusCode::BAD_REQUEST, "invalid_record", Some(e.to_string()))
            }
            ApiError::Store(e @ StoreError::StorageUnavailable(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "storage_unavailable",
                Some(e.to_string()),
            ),
            ApiError::Tracker(TrackerError::PermissionDenied)
            | ApiError::Source(SourceError::Unauthorized) => {
                (StatusCode::FORBIDDEN, "permission_denied", None)
            }
            ApiError::Tracker(e @ (TrackerError::ProviderLost | TrackerError::Source(_))) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "provider_unavailable",
                Some(e.to_string()),
            ),
            ApiError::Tracker(e @ TrackerError::WriterStopped) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "tracker_failed",
                Some(e.to_string()),
            ),
            ApiError::Source(e @ SourceError::Disabled) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "provider_unavailable",
                Some(e.to_string()),
            ),
            ApiError::Projection(e) => (
                StatusCode::BAD_REQUEST,
                "coordinate_out_of_range",
                Some(e.to_string()),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = self.parts();
        let body = match message {
            Some(msg) => ErrorResponse::with_message(error, &msg),
            None => ErrorResponse::new(error),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: &str) -> Self {
        ErrorResponse {
            error: error.to_string(),
            message: None,
        }
    }

    pub fn with_message(error: &str, message: &str) -> Self {
        ErrorResponse {
            error: error.to_string(),
            message: Some(message.to_string()),
        }
    }
}

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::source::{Authorization, Fix, PushOutcome};
use crate::web::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::web::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthorizationRequest {
    pub granted: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthorizationResponse {
    pub authorization: Authorization,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PushResponse {
    pub outcome: PushOutcome,
}

#[utoipa::path(
    get,
    path = "/api/source/fix",
    tag = "source",
    responses(
        (status = 200, description = "Current position, null when unavailable", body = Fix)
    )
)]
pub async fn current_fix(State(state): State<AppState>) -> ApiResult<Json<Option<Fix>>> {
    Ok(Json(state.source.source.current_fix()))
}

#[utoipa::path(
    put,
    path = "/api/source/authorization",
    tag = "source",
    request_body = AuthorizationRequest,
    responses(
        (status = 200, description = "New authorization state", body = AuthorizationResponse)
    )
)]
pub async fn set_authorization(
    State(state): State<AppState>,
    Json(request): Json<AuthorizationRequest>,
) -> ApiResult<Json<AuthorizationResponse>> {
    state.source.authorization.set(request.granted);
    log::info!(
        "Location permission {}",
        if request.granted { "granted" } else { "revoked" }
    );
    Ok(Json(AuthorizationResponse {
        authorization: state.source.authorization.get(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/source/fixes",
    tag = "source",
    request_body = Fix,
    responses(
        (status = 200, description = "Fix accepted by the manual source", body = PushResponse),
        (status = 409, description = "Configured source does not take pushed fixes", body = ErrorResponse),
        (status = 503, description = "Provider disabled", body = ErrorResponse)
    )
)]
pub async fn push_fix(
    State(state): State<AppState>,
    Json(fix): Json<Fix>,
) -> ApiResult<Json<PushResponse>> {
    let manual = state
        .source
        .manual
        .as_ref()
        .ok_or(ApiError::Conflict("source_not_manual"))?;
    let outcome = manual.push(fix)?;
    Ok(Json(PushResponse { outcome }))
}

#[utoipa::path(
    post,
    path = "/api/source/disable",
    tag = "source",
    responses(
        (status = 204, description = "Provider disabled, any active feed ends"),
        (status = 409, description = "Configured source cannot be disabled", body = ErrorResponse)
    )
)]
pub async fn disable(State(state): State<AppState>) -> ApiResult<axum::http::StatusCode> {
    let manual = state
        .source
        .manual
        .as_ref()
        .ok_or(ApiError::Conflict("source_not_manual"))?;
    manual.disable();
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/source/enable",
    tag = "source",
    responses(
        (status = 204, description = "Provider enabled"),
        (status = 409, description = "Configured source cannot be toggled", body = ErrorResponse)
    )
)]
pub async fn enable(State(state): State<AppState>) -> ApiResult<axum::http::StatusCode> {
    let manual = state
        .source
        .manual
        .as_ref()
        .ok_or(ApiError::Conflict("source_not_manual"))?;
    manual.enable();
    Ok(axum::http::StatusCode::NO_CONTENT)
}

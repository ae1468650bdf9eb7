//! Flag REST API Routes
//!
//! Thin handlers over [`FlagService`]. Each request gets its own
//! [`OpContext`](flagkeep_core::OpContext) bounded by the configured request
//! timeout.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json,
};
use flagkeep_core::NewFlag;

use crate::{
    error::{ApiError, ApiResult},
    extractors::ApiJson,
    service::FlagService,
    state::{AppState, RequestTimeout},
    types::{FlagNamesRequest, FlagResponse, ListFlagsResponse, UpdateFlagRequest},
};

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /flags - List all live flags
#[utoipa::path(
    get,
    path = "/flags",
    tag = "Flags",
    responses(
        (status = 200, description = "Live flags", body = ListFlagsResponse),
        (status = 500, description = "Storage failure", body = ApiError),
    )
)]
pub async fn list_flags(
    State(service): State<FlagService>,
    State(timeout): State<RequestTimeout>,
) -> ApiResult<impl IntoResponse> {
    let flags = service.list_all_flags(&timeout.context()).await?;
    Ok(Json(ListFlagsResponse { flags }))
}

/// POST /flags - Resolve several flags by name
#[utoipa::path(
    post,
    path = "/flags",
    tag = "Flags",
    request_body = FlagNamesRequest,
    responses(
        (status = 200, description = "Every requested flag", body = ListFlagsResponse),
        (status = 400, description = "Empty or oversized batch", body = ApiError),
        (status = 404, description = "Some or all names are unknown", body = ApiError),
    )
)]
pub async fn get_flags_by_names(
    State(service): State<FlagService>,
    State(timeout): State<RequestTimeout>,
    ApiJson(req): ApiJson<FlagNamesRequest>,
) -> ApiResult<impl IntoResponse> {
    let flags = service
        .get_flags_by_names(&timeout.context(), req.flag_names)
        .await?;
    Ok(Json(ListFlagsResponse { flags }))
}

/// POST /flag - Create a flag, or revive a soft-deleted one
#[utoipa::path(
    post,
    path = "/flag",
    tag = "Flags",
    request_body = NewFlag,
    responses(
        (status = 201, description = "Flag created", body = FlagResponse),
        (status = 400, description = "Invalid input", body = ApiError),
        (status = 409, description = "Flag already exists", body = ApiError),
    )
)]
pub async fn create_flag(
    State(service): State<FlagService>,
    State(timeout): State<RequestTimeout>,
    ApiJson(new_flag): ApiJson<NewFlag>,
) -> ApiResult<impl IntoResponse> {
    let flag = service.create_flag(&timeout.context(), new_flag).await?;
    Ok((StatusCode::CREATED, Json(FlagResponse { flag })))
}

/// GET /flag/{name} - Get a live flag
#[utoipa::path(
    get,
    path = "/flag/{name}",
    tag = "Flags",
    params(
        ("name" = String, Path, description = "Flag name")
    ),
    responses(
        (status = 200, description = "Flag details", body = FlagResponse),
        (status = 404, description = "Flag not found", body = ApiError),
    )
)]
pub async fn get_flag(
    State(service): State<FlagService>,
    State(timeout): State<RequestTimeout>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let flag = service.get_flag_by_name(&timeout.context(), &name).await?;
    Ok(Json(FlagResponse { flag }))
}

/// PUT /flag/{name} - Update a live flag
#[utoipa::path(
    put,
    path = "/flag/{name}",
    tag = "Flags",
    params(
        ("name" = String, Path, description = "Flag name")
    ),
    request_body = UpdateFlagRequest,
    responses(
        (status = 200, description = "Flag updated", body = FlagResponse),
        (status = 400, description = "Body name does not match path", body = ApiError),
        (status = 404, description = "Flag not found", body = ApiError),
        (status = 409, description = "Flag deleted or modified concurrently", body = ApiError),
    )
)]
pub async fn update_flag(
    State(service): State<FlagService>,
    State(timeout): State<RequestTimeout>,
    Path(name): Path<String>,
    ApiJson(req): ApiJson<UpdateFlagRequest>,
) -> ApiResult<impl IntoResponse> {
    let flag = service.update_flag(&timeout.context(), &name, req).await?;
    Ok(Json(FlagResponse { flag }))
}

/// DELETE /flag/{name} - Soft-delete a flag
#[utoipa::path(
    delete,
    path = "/flag/{name}",
    tag = "Flags",
    params(
        ("name" = String, Path, description = "Flag name")
    ),
    responses(
        (status = 204, description = "Flag deleted"),
        (status = 404, description = "Flag not found or already deleted", body = ApiError),
    )
)]
pub async fn delete_flag(
    State(service): State<FlagService>,
    State(timeout): State<RequestTimeout>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    service.delete_flag(&timeout.context(), &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// ROUTER SETUP
// ============================================================================

/// Create the flag routes router.
pub fn create_router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/flags", get(list_flags).post(get_flags_by_names))
        .route("/flag", post(create_flag))
        .route(
            "/flag/:name",
            get(get_flag).put(update_flag).delete(delete_flag),
        )
}

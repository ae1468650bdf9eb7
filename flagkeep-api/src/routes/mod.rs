//! REST API Routes Module
//!
//! Includes:
//! - Flag CRUD and batch resolution
//! - Health check endpoints (Kubernetes-compatible)
//! - The generated OpenAPI document
//! - CORS support for browser-based clients

pub mod flag;
pub mod health;

use axum::{
    http::{header, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;

use crate::openapi::ApiDoc;
use crate::state::AppState;

pub use flag::create_router as flag_router;
pub use health::create_router as health_router;

/// Handler for /openapi.json endpoint.
async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_origin(Any)
}

/// Assemble the full application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(flag::create_router())
        .nest("/health", health::create_router())
        .route("/openapi.json", get(openapi_json))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
        .with_state(state)
}

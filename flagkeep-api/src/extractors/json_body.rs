//! JSON body extractor with structured rejections.
//!
//! Axum's `Json` rejects malformed bodies with a plain-text response. `ApiJson`
//! wraps it so that every failure, including body parsing, comes back as an
//! [`ApiError`] with code `INVALID_FORMAT`.

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Extractor for JSON request bodies.
///
/// # Example
///
/// ```rust,ignore
/// async fn create_flag(ApiJson(new_flag): ApiJson<NewFlag>) -> ApiResult<impl IntoResponse> {
///     // new_flag is already deserialized
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::invalid_format(rejection.body_text())),
        }
    }
}

//! OpenAPI Specification for the flagkeep API
//!
//! Generated by utoipa from the route annotations and schema derives.

use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode};
use crate::routes::{flag, health};
use crate::types::{FlagNamesRequest, FlagResponse, ListFlagsResponse, UpdateFlagRequest};
use flagkeep_core::{Flag, NewFlag};

/// OpenAPI document for the flagkeep API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "flagkeep API",
        version = "0.1.0",
        description = "Feature flag registry with a cache-aside read path"
    ),
    tags(
        (name = "Flags", description = "Create, read, update, soft-delete and batch-resolve flags"),
        (name = "Health", description = "Liveness and readiness checks")
    ),
    paths(
        flag::list_flags,
        flag::get_flags_by_names,
        flag::create_flag,
        flag::get_flag,
        flag::update_flag,
        flag::delete_flag,
        health::ping,
        health::liveness,
        health::readiness,
    ),
    components(schemas(
        Flag,
        NewFlag,
        UpdateFlagRequest,
        FlagNamesRequest,
        FlagResponse,
        ListFlagsResponse,
        ApiError,
        ErrorCode,
        health::HealthResponse,
        health::HealthStatus,
        health::HealthDetails,
        health::ComponentHealth,
        health::CacheHealth,
    ))
)]
pub struct ApiDoc;

impl ApiDoc {
    /// The document rendered as pretty JSON.
    pub fn to_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_has_all_operations() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in ["/flags", "/flag", "/flag/{name}", "/health/ready"] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing path {expected}"
            );
        }
    }

    #[test]
    fn test_timestamp_and_actor_fields_are_formatted_strings() {
        let doc = serde_json::to_value(ApiDoc::openapi()).expect("serialize");
        let flag = &doc["components"]["schemas"]["Flag"]["properties"];
        assert_eq!(flag["active_from"]["type"], "string");
        assert_eq!(flag["active_from"]["format"], "date-time");
        assert_eq!(flag["updated_at"]["format"], "date-time");
        assert_eq!(flag["created_by"]["format"], "uuid");

        let new_flag = &doc["components"]["schemas"]["NewFlag"]["properties"];
        assert_eq!(new_flag["created_by"]["format"], "uuid");

        let update = &doc["components"]["schemas"]["UpdateFlagRequest"]["properties"];
        assert_eq!(update["active_from"]["format"], "date-time");
        assert_eq!(update["created_by"]["format"], "uuid");
    }

    #[test]
    fn test_document_serializes() {
        let json = ApiDoc::to_json().expect("serialize");
        assert!(json.contains("\"Flags\""));
        assert!(json.contains("FLAG_NOT_FOUND"));
    }
}

//! Flag-related API types

use flagkeep_core::{ActorId, Flag, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Request to update a live flag.
///
/// `created_by` and `updated_at` echo what the caller last read. They are
/// required when the service runs with the `require_match` update policy and
/// ignored otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UpdateFlagRequest {
    /// Must match the name in the request path
    pub flag_name: String,
    #[serde(default)]
    pub is_enabled: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = DateTime))]
    pub active_from: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub data: JsonValue,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub default_data: JsonValue,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<ActorId>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = DateTime))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
}

/// Request to resolve several flags at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct FlagNamesRequest {
    /// Names to resolve; duplicates are collapsed
    pub flag_names: Vec<String>,
}

/// Response wrapping a single flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct FlagResponse {
    pub flag: Flag,
}

/// Response containing a list of flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ListFlagsResponse {
    /// Live flags
    pub flags: Vec<Flag>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_request_optional_precondition_fields() {
        let req: UpdateFlagRequest = serde_json::from_value(json!({
            "flag_name": "checkout",
            "is_enabled": true,
            "active_from": "2025-09-08T12:00:00Z",
            "data": {"b": 1, "a": 2},
            "default_data": {}
        }))
        .expect("deserialize");
        assert!(req.created_by.is_none());
        assert!(req.updated_at.is_none());

        let keys: Vec<&String> = req.data.as_object().expect("object").keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn test_names_request_shape() {
        let req: FlagNamesRequest =
            serde_json::from_value(json!({"flag_names": ["a", "b"]})).expect("deserialize");
        assert_eq!(req.flag_names, vec!["a", "b"]);
    }
}

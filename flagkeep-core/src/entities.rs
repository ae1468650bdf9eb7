//! Flag entity and its write inputs.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::identity::{ActorId, FlagName, Timestamp};

/// A named configuration record.
///
/// `name` is the primary key of the flags table and never changes after
/// creation. A row is never physically removed by a normal delete; it is
/// marked with `is_deleted` and stays addressable by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Flag {
    #[serde(rename = "flag_name")]
    pub name: FlagName,
    #[serde(rename = "is_enabled")]
    pub enabled: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = DateTime))]
    pub active_from: Timestamp,
    /// Flag-specific payload.
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub data: JsonValue,
    /// Fallback payload.
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub default_data: JsonValue,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub created_by: ActorId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = DateTime))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = DateTime))]
    pub updated_at: Timestamp,
    #[serde(default)]
    pub is_deleted: bool,
}

impl Flag {
    /// Build a fresh live row from create input, stamped with `now`.
    pub fn from_new(new_flag: NewFlag, now: Timestamp) -> Self {
        Self {
            name: new_flag.name,
            enabled: new_flag.enabled,
            active_from: new_flag.active_from,
            data: new_flag.data,
            default_data: new_flag.default_data,
            created_by: new_flag.created_by,
            created_at: now,
            updated_at: now,
            is_deleted: false,
        }
    }

    /// A flag is live iff it has not been soft-deleted.
    pub fn is_live(&self) -> bool {
        !self.is_deleted
    }

    /// Overwrite a soft-deleted row in place with create input.
    ///
    /// The row keeps its name; every other column takes the new values.
    pub fn revive(&mut self, new_flag: NewFlag, now: Timestamp) {
        debug_assert_eq!(self.name, new_flag.name);
        *self = Self::from_new(new_flag, now);
    }

    /// Apply the mutable fields of an update. `created_by` and `created_at`
    /// are preserved.
    pub fn apply_update(&mut self, update: &FlagUpdate, now: Timestamp) {
        self.enabled = update.enabled;
        self.active_from = update.active_from;
        self.data = update.data.clone();
        self.default_data = update.default_data.clone();
        self.updated_at = now;
    }

    /// Mark the row deleted.
    pub fn mark_deleted(&mut self, now: Timestamp) {
        self.is_deleted = true;
        self.updated_at = now;
    }
}

/// Input for creating (or reviving) a flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NewFlag {
    #[serde(rename = "flag_name")]
    pub name: FlagName,
    #[serde(rename = "is_enabled", default)]
    pub enabled: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = DateTime))]
    pub active_from: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub data: JsonValue,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub default_data: JsonValue,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub created_by: ActorId,
}

/// Input for updating a live flag.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagUpdate {
    pub name: FlagName,
    pub enabled: bool,
    pub active_from: Timestamp,
    pub data: JsonValue,
    pub default_data: JsonValue,
    /// Optimistic-concurrency check, evaluated under the row lock.
    pub precondition: Option<UpdatePrecondition>,
}

/// What the caller believes the stored row looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdatePrecondition {
    pub created_by: ActorId,
    pub updated_at: Timestamp,
}

impl UpdatePrecondition {
    /// Whether `stored` still matches what the caller last saw.
    pub fn holds_for(&self, stored: &Flag) -> bool {
        self.created_by == stored.created_by && self.updated_at == stored.updated_at
    }
}

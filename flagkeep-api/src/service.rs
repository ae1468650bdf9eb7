//! Flag Service
//!
//! The boundary between HTTP handlers and the [`FlagStore`]. It validates
//! input, applies the configured update policy, and maps store errors onto
//! [`ApiError`]s. It holds no state beyond its configuration.
//!
//! Flag names are case and whitespace sensitive and pass through unchanged.
//! Trimming applies only to batch name lists and to the path/body name
//! comparison on update.

use std::fmt;
use std::str::FromStr;

use flagkeep_core::{Flag, FlagUpdate, NewFlag, OpContext, UpdatePrecondition};
use flagkeep_storage::{CacheStats, FlagStore};
use serde_json::Value as JsonValue;
use tracing::instrument;

use crate::error::{ApiError, ApiResult};
use crate::types::UpdateFlagRequest;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// How updates treat the caller's view of the stored row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpdatePolicy {
    /// Last writer wins.
    #[default]
    Overwrite,
    /// The request must carry the stored `created_by` and `updated_at`; the
    /// repository checks them under the row lock.
    RequireMatch,
}

impl fmt::Display for UpdatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            UpdatePolicy::Overwrite => "overwrite",
            UpdatePolicy::RequireMatch => "require_match",
        };
        write!(f, "{}", value)
    }
}

impl FromStr for UpdatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(UpdatePolicy::Overwrite),
            "require_match" => Ok(UpdatePolicy::RequireMatch),
            _ => Err(format!("Invalid UpdatePolicy: {}", s)),
        }
    }
}

/// Service-level limits and policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub update_policy: UpdatePolicy,
    /// Maximum flag name length in characters, after trimming.
    pub max_name_length: usize,
    /// Maximum number of distinct names in one batch request.
    pub max_batch_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            update_policy: UpdatePolicy::Overwrite,
            max_name_length: 30,
            max_batch_size: 100,
        }
    }
}

// ============================================================================
// SERVICE
// ============================================================================

#[derive(Debug, Clone)]
pub struct FlagService {
    store: FlagStore,
    config: ServiceConfig,
}

impl FlagService {
    pub fn new(store: FlagStore, config: ServiceConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &FlagStore {
        &self.store
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.store.cache_stats()
    }

    #[instrument(skip(self, ctx, new_flag), fields(flag = %new_flag.name))]
    pub async fn create_flag(&self, ctx: &OpContext, new_flag: NewFlag) -> ApiResult<Flag> {
        self.validate_name(&new_flag.name)?;
        validate_payload("data", &new_flag.data)?;
        validate_payload("default_data", &new_flag.default_data)?;
        Ok(self.store.create(ctx, new_flag).await?)
    }

    #[instrument(skip(self, ctx))]
    pub async fn get_flag_by_name(&self, ctx: &OpContext, name: &str) -> ApiResult<Flag> {
        self.validate_name(name)?;
        Ok(self.store.get_by_name(ctx, name).await?)
    }

    /// Update the flag named in the body. The trimmed body name must equal
    /// the trimmed path name; the body name is used as given.
    #[instrument(skip(self, ctx, request))]
    pub async fn update_flag(
        &self,
        ctx: &OpContext,
        path_name: &str,
        request: UpdateFlagRequest,
    ) -> ApiResult<Flag> {
        if request.flag_name.trim() != path_name.trim() {
            return Err(ApiError::invalid_input(format!(
                "Flag name in body '{}' does not match path '{}'",
                request.flag_name, path_name
            )));
        }
        self.validate_name(&request.flag_name)?;
        validate_payload("data", &request.data)?;
        validate_payload("default_data", &request.default_data)?;

        let precondition = match self.config.update_policy {
            UpdatePolicy::Overwrite => None,
            UpdatePolicy::RequireMatch => Some(UpdatePrecondition {
                created_by: request
                    .created_by
                    .ok_or_else(|| ApiError::missing_field("created_by"))?,
                updated_at: request
                    .updated_at
                    .ok_or_else(|| ApiError::missing_field("updated_at"))?,
            }),
        };

        let update = FlagUpdate {
            name: request.flag_name,
            enabled: request.is_enabled,
            active_from: request.active_from,
            data: request.data,
            default_data: request.default_data,
            precondition,
        };
        Ok(self.store.update(ctx, update).await?)
    }

    #[instrument(skip(self, ctx))]
    pub async fn delete_flag(&self, ctx: &OpContext, name: &str) -> ApiResult<()> {
        self.validate_name(name)?;
        Ok(self.store.delete(ctx, name).await?)
    }

    #[instrument(skip(self, ctx))]
    pub async fn list_all_flags(&self, ctx: &OpContext) -> ApiResult<Vec<Flag>> {
        Ok(self.store.list_all(ctx).await?)
    }

    /// Resolve a batch of names after trimming and de-duplicating them.
    #[instrument(skip(self, ctx, names), fields(requested = names.len()))]
    pub async fn get_flags_by_names(
        &self,
        ctx: &OpContext,
        names: Vec<String>,
    ) -> ApiResult<Vec<Flag>> {
        let names = self.normalize_batch(names)?;
        Ok(self.store.get_by_names(ctx, &names).await?)
    }

    /// Readiness of the backing repository.
    pub async fn health_check(&self, ctx: &OpContext) -> ApiResult<()> {
        Ok(self.store.repository().health_check(ctx).await?)
    }

    /// Reject blank or overlong names. The name itself is not altered.
    fn validate_name(&self, name: &str) -> ApiResult<()> {
        if name.trim().is_empty() {
            return Err(ApiError::invalid_input("Flag name must not be empty"));
        }
        if name.chars().count() > self.config.max_name_length {
            return Err(ApiError::invalid_input(format!(
                "Flag name must be at most {} characters",
                self.config.max_name_length
            )));
        }
        Ok(())
    }

    /// Trim, drop blanks, collapse duplicates keeping first occurrence, and
    /// check each name and the batch size.
    fn normalize_batch(&self, names: Vec<String>) -> ApiResult<Vec<String>> {
        let mut distinct: Vec<String> = Vec::with_capacity(names.len());
        for raw in &names {
            let name = raw.trim();
            if name.is_empty() {
                continue;
            }
            self.validate_name(name)?;
            if !distinct.iter().any(|d| d == name) {
                distinct.push(name.to_string());
            }
        }

        if distinct.is_empty() {
            return Err(ApiError::invalid_input("flag_names must contain at least one name"));
        }
        if distinct.len() > self.config.max_batch_size {
            return Err(ApiError::invalid_input(format!(
                "At most {} flags may be requested at once",
                self.config.max_batch_size
            )));
        }
        Ok(distinct)
    }
}

fn validate_payload(field: &str, value: &JsonValue) -> ApiResult<()> {
    if value.is_object() {
        Ok(())
    } else {
        Err(ApiError::invalid_input(format!(
            "Field '{}' must be a JSON object",
            field
        )))
    }
}

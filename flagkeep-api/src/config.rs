//! API Configuration Module
//!
//! Every setting is read from a `FLAGKEEP_`-prefixed environment variable with
//! a development-friendly default. Values that are present but malformed are
//! rejected with [`ConfigError::InvalidValue`] rather than silently replaced.
//!
//! Loading goes through a lookup function so tests can supply a fixed map
//! instead of mutating the process environment.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use flagkeep_core::ConfigError;
use flagkeep_storage::CacheConfig;

use crate::db::DbConfig;
use crate::migrations::MigrationAction;
use crate::service::{ServiceConfig, UpdatePolicy};
use crate::telemetry::TelemetryConfig;

/// Source of configuration values by variable name.
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

// ============================================================================
// LOOKUP HELPERS
// ============================================================================

pub(crate) fn var_or(lookup: Lookup<'_>, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_string())
}

pub(crate) fn parse_or<T>(lookup: Lookup<'_>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                field: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

fn positive_secs(lookup: Lookup<'_>, key: &str, default: u64) -> Result<Duration, ConfigError> {
    let secs: u64 = parse_or(lookup, key, default)?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            field: key.to_string(),
            value: "0".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

/// Lookup over a fixed set of variables.
pub fn map_lookup(vars: HashMap<String, String>) -> impl Fn(&str) -> Option<String> {
    move |key: &str| vars.get(key).cloned()
}

// ============================================================================
// SERVER
// ============================================================================

/// HTTP listener and request lifecycle settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on draining in-flight requests after a shutdown signal.
    pub shutdown_timeout: Duration,
    /// Deadline attached to every store operation a request performs.
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Environment variables:
    /// - `FLAGKEEP_HOST` (default `0.0.0.0`)
    /// - `FLAGKEEP_PORT`, falling back to `PORT` (default 8080)
    /// - `FLAGKEEP_SHUTDOWN_TIMEOUT_SECS` (default 10)
    /// - `FLAGKEEP_REQUEST_TIMEOUT_SECS` (default 5)
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let port_key = if lookup("FLAGKEEP_PORT").is_some() {
            "FLAGKEEP_PORT"
        } else {
            "PORT"
        };
        Ok(Self {
            host: var_or(lookup, "FLAGKEEP_HOST", &defaults.host),
            port: parse_or(lookup, port_key, defaults.port)?,
            shutdown_timeout: positive_secs(lookup, "FLAGKEEP_SHUTDOWN_TIMEOUT_SECS", 10)?,
            request_timeout: positive_secs(lookup, "FLAGKEEP_REQUEST_TIMEOUT_SECS", 5)?,
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse().map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
            field: "FLAGKEEP_HOST".to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })
    }
}

// ============================================================================
// CACHE
// ============================================================================

/// Cache sizing and expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub capacity: NonZeroUsize,
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let config = CacheConfig::default();
        Self {
            capacity: config.capacity,
            ttl: config.ttl,
        }
    }
}

impl CacheSettings {
    /// Environment variables:
    /// - `FLAGKEEP_CACHE_SIZE` (default 1024, must be > 0)
    /// - `FLAGKEEP_CACHE_TTL_SECS` (default 60, must be > 0)
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let size: usize = parse_or(lookup, "FLAGKEEP_CACHE_SIZE", defaults.capacity.get())?;
        let capacity = NonZeroUsize::new(size).ok_or_else(|| ConfigError::InvalidValue {
            field: "FLAGKEEP_CACHE_SIZE".to_string(),
            value: size.to_string(),
            reason: "must be greater than zero".to_string(),
        })?;
        Ok(Self {
            capacity,
            ttl: positive_secs(lookup, "FLAGKEEP_CACHE_TTL_SECS", defaults.ttl.as_secs())?,
        })
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_capacity(self.capacity)
            .with_ttl(self.ttl)
    }
}

// ============================================================================
// SERVICE
// ============================================================================

impl ServiceConfig {
    /// Environment variables:
    /// - `FLAGKEEP_UPDATE_POLICY`: `overwrite` (default) or `require_match`
    /// - `FLAGKEEP_MAX_NAME_LENGTH` (default 30)
    /// - `FLAGKEEP_MAX_BATCH_SIZE` (default 100)
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let max_name_length = parse_or(lookup, "FLAGKEEP_MAX_NAME_LENGTH", defaults.max_name_length)?;
        let max_batch_size = parse_or(lookup, "FLAGKEEP_MAX_BATCH_SIZE", defaults.max_batch_size)?;
        for (field, value) in [
            ("FLAGKEEP_MAX_NAME_LENGTH", max_name_length),
            ("FLAGKEEP_MAX_BATCH_SIZE", max_batch_size),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: "0".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(Self {
            update_policy: parse_or(lookup, "FLAGKEEP_UPDATE_POLICY", UpdatePolicy::default())?,
            max_name_length,
            max_batch_size,
        })
    }
}

// ============================================================================
// MIGRATIONS
// ============================================================================

/// What the binary does to the schema at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationConfig {
    pub action: MigrationAction,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            action: MigrationAction::Up,
        }
    }
}

impl MigrationConfig {
    /// Environment variables:
    /// - `FLAGKEEP_MIGRATION_ACTION`: `up` (default), `down`, `up-to`,
    ///   `down-to` or `skip`
    /// - `FLAGKEEP_MIGRATION_VERSION`: target for `up-to` / `down-to`
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let action = var_or(lookup, "FLAGKEEP_MIGRATION_ACTION", "up");
        let version: Option<i64> = match lookup("FLAGKEEP_MIGRATION_VERSION") {
            None => None,
            Some(_) => Some(parse_or(lookup, "FLAGKEEP_MIGRATION_VERSION", 0)?),
        };
        Ok(Self {
            action: MigrationAction::parse(&action, version)?,
        })
    }
}

// ============================================================================
// APPLICATION CONFIG
// ============================================================================

/// Everything the binary needs to start.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub db: DbConfig,
    pub server: ServerConfig,
    pub cache: CacheSettings,
    pub service: ServiceConfig,
    pub migration: MigrationConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            db: DbConfig::from_lookup(lookup)?,
            server: ServerConfig::from_lookup(lookup)?,
            cache: CacheSettings::from_lookup(lookup)?,
            service: ServiceConfig::from_lookup(lookup)?,
            migration: MigrationConfig::from_lookup(lookup)?,
            telemetry: TelemetryConfig::from_lookup(lookup),
        })
    }
}

//! flagkeep API - HTTP Layer for the Flag Registry
//!
//! Wires the cache-aside [`FlagStore`](flagkeep_storage::FlagStore) to a
//! Postgres repository and exposes it over an Axum REST API. Also hosts
//! configuration loading, embedded schema migrations and logging setup.

pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod macros;
pub mod migrations;
pub mod openapi;
pub mod routes;
pub mod service;
pub mod state;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use config::{AppConfig, CacheSettings, MigrationConfig, ServerConfig};
pub use db::{DbConfig, PgFlagRepository};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use migrations::{MigrationAction, MigrationError, Migrator};
pub use openapi::ApiDoc;
pub use routes::create_router;
pub use service::{FlagService, ServiceConfig, UpdatePolicy};
pub use state::AppState;
pub use types::*;

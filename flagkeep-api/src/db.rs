//! Database Connection Pool and Postgres Flag Repository
//!
//! PostgreSQL connection pooling via deadpool-postgres and the
//! [`FlagRepository`] implementation over `public.flags`.
//!
//! Writes run in a transaction that first locks the target row with
//! `SELECT ... FOR UPDATE`, so create, update and delete on the same name
//! are serialized by the database. Every operation runs under
//! [`OpContext::run`]; when the context ends first the operation future,
//! and with it any open transaction, is dropped and rolled back.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{
    Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime, Timeouts,
};
use flagkeep_core::{
    store_now, ConfigError, Flag, FlagUpdate, NewFlag, OpContext, StoreError, StoreResult,
};
use flagkeep_storage::FlagRepository;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};
use tracing::instrument;

use crate::config::{parse_or, var_or, Lookup};
use crate::error::{ApiError, ApiResult};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection wait/create timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "flagkeep".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    /// Environment variables: `FLAGKEEP_DB_HOST`, `FLAGKEEP_DB_PORT`,
    /// `FLAGKEEP_DB_NAME`, `FLAGKEEP_DB_USER`, `FLAGKEEP_DB_PASSWORD`,
    /// `FLAGKEEP_DB_POOL_SIZE`, `FLAGKEEP_DB_TIMEOUT` (seconds).
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            host: var_or(lookup, "FLAGKEEP_DB_HOST", &defaults.host),
            port: parse_or(lookup, "FLAGKEEP_DB_PORT", defaults.port)?,
            dbname: var_or(lookup, "FLAGKEEP_DB_NAME", &defaults.dbname),
            user: var_or(lookup, "FLAGKEEP_DB_USER", &defaults.user),
            password: lookup("FLAGKEEP_DB_PASSWORD").unwrap_or_default(),
            max_size: parse_or(lookup, "FLAGKEEP_DB_POOL_SIZE", defaults.max_size)?,
            timeout: Duration::from_secs(parse_or(
                lookup,
                "FLAGKEEP_DB_TIMEOUT",
                defaults.timeout.as_secs(),
            )?),
        })
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = PoolConfig::new(self.max_size);
        pool_cfg.timeouts = Timeouts {
            wait: Some(self.timeout),
            create: Some(self.timeout),
            recycle: Some(self.timeout),
        };
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

const FLAG_COLUMNS: &str = "flag_name, is_deleted, is_enabled, active_from, data, \
                            default_data, created_by, created_at, updated_at";

/// Map a `public.flags` row selected with [`FLAG_COLUMNS`] onto a [`Flag`].
fn flag_from_row(row: &Row) -> StoreResult<Flag> {
    Ok(Flag {
        name: row.try_get(0).map_err(db_error)?,
        is_deleted: row.try_get(1).map_err(db_error)?,
        enabled: row.try_get(2).map_err(db_error)?,
        active_from: row.try_get(3).map_err(db_error)?,
        data: row.try_get(4).map_err(db_error)?,
        default_data: row.try_get(5).map_err(db_error)?,
        created_by: row.try_get(6).map_err(db_error)?,
        created_at: row.try_get(7).map_err(db_error)?,
        updated_at: row.try_get(8).map_err(db_error)?,
    })
}

fn db_error(err: tokio_postgres::Error) -> StoreError {
    StoreError::internal(format!("database error: {}", err))
}

fn pool_error(err: deadpool_postgres::PoolError) -> StoreError {
    StoreError::internal(format!("connection pool error: {}", err))
}

/// Like [`db_error`], but a primary-key race on insert means another
/// transaction created the flag first.
fn insert_error(err: tokio_postgres::Error, name: &str) -> StoreError {
    if let Some(db_err) = err.as_db_error() {
        if db_err.code() == &SqlState::UNIQUE_VIOLATION {
            return StoreError::already_exists(name);
        }
    }
    db_error(err)
}

// ============================================================================
// POSTGRES REPOSITORY
// ============================================================================

/// [`FlagRepository`] over a Postgres connection pool.
#[derive(Clone)]
pub struct PgFlagRepository {
    pool: Pool,
}

impl PgFlagRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a repository from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> StoreResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error)
    }
}

#[async_trait]
impl FlagRepository for PgFlagRepository {
    #[instrument(skip(self, ctx, new_flag), fields(flag = %new_flag.name))]
    async fn create(&self, ctx: &OpContext, new_flag: NewFlag) -> StoreResult<Flag> {
        ctx.run("create", async {
            let mut conn = self.get_conn().await?;
            let tx = conn.transaction().await.map_err(db_error)?;

            let existing = tx
                .query_opt(
                    "SELECT is_deleted FROM public.flags WHERE flag_name = $1 FOR UPDATE",
                    &[&new_flag.name],
                )
                .await
                .map_err(db_error)?;

            let flag = Flag::from_new(new_flag, store_now());
            match existing {
                Some(row) => {
                    let is_deleted: bool = row.try_get(0).map_err(db_error)?;
                    if !is_deleted {
                        return Err(StoreError::already_exists(&flag.name));
                    }
                    tx.execute(
                        "UPDATE public.flags SET is_deleted = FALSE, is_enabled = $2, \
                         active_from = $3, data = $4, default_data = $5, created_by = $6, \
                         created_at = $7, updated_at = $8 WHERE flag_name = $1",
                        &[
                            &flag.name,
                            &flag.enabled,
                            &flag.active_from,
                            &flag.data,
                            &flag.default_data,
                            &flag.created_by,
                            &flag.created_at,
                            &flag.updated_at,
                        ],
                    )
                    .await
                    .map_err(db_error)?;
                }
                None => {
                    tx.execute(
                        "INSERT INTO public.flags (flag_name, is_deleted, is_enabled, \
                         active_from, data, default_data, created_by, created_at, updated_at) \
                         VALUES ($1, FALSE, $2, $3, $4, $5, $6, $7, $8)",
                        &[
                            &flag.name,
                            &flag.enabled,
                            &flag.active_from,
                            &flag.data,
                            &flag.default_data,
                            &flag.created_by,
                            &flag.created_at,
                            &flag.updated_at,
                        ],
                    )
                    .await
                    .map_err(|e| insert_error(e, &flag.name))?;
                }
            }

            tx.commit().await.map_err(|e| insert_error(e, &flag.name))?;
            Ok(flag)
        })
        .await
    }

    #[instrument(skip(self, ctx))]
    async fn get_by_name(&self, ctx: &OpContext, name: &str) -> StoreResult<Flag> {
        ctx.run("get_by_name", async {
            let conn = self.get_conn().await?;
            let query = format!("SELECT {FLAG_COLUMNS} FROM public.flags WHERE flag_name = $1");
            let row = conn
                .query_opt(query.as_str(), &[&name])
                .await
                .map_err(db_error)?
                .ok_or_else(|| StoreError::not_found(name))?;
            flag_from_row(&row)
        })
        .await
    }

    #[instrument(skip(self, ctx, update), fields(flag = %update.name))]
    async fn update(&self, ctx: &OpContext, update: FlagUpdate) -> StoreResult<Flag> {
        ctx.run("update", async {
            let mut conn = self.get_conn().await?;
            let tx = conn.transaction().await.map_err(db_error)?;

            let query =
                format!("SELECT {FLAG_COLUMNS} FROM public.flags WHERE flag_name = $1 FOR UPDATE");
            let row = tx
                .query_opt(query.as_str(), &[&update.name])
                .await
                .map_err(db_error)?
                .ok_or_else(|| StoreError::not_found(&update.name))?;
            let mut flag = flag_from_row(&row)?;

            if !flag.is_live() {
                return Err(StoreError::deleted(&update.name));
            }
            if let Some(precondition) = &update.precondition {
                if !precondition.holds_for(&flag) {
                    return Err(StoreError::PreconditionFailed {
                        name: update.name.clone(),
                    });
                }
            }

            flag.apply_update(&update, store_now());
            tx.execute(
                "UPDATE public.flags SET is_enabled = $2, active_from = $3, data = $4, \
                 default_data = $5, updated_at = $6 WHERE flag_name = $1",
                &[
                    &flag.name,
                    &flag.enabled,
                    &flag.active_from,
                    &flag.data,
                    &flag.default_data,
                    &flag.updated_at,
                ],
            )
            .await
            .map_err(db_error)?;

            tx.commit().await.map_err(db_error)?;
            Ok(flag)
        })
        .await
    }

    #[instrument(skip(self, ctx))]
    async fn delete(&self, ctx: &OpContext, name: &str) -> StoreResult<()> {
        ctx.run("delete", async {
            let mut conn = self.get_conn().await?;
            let tx = conn.transaction().await.map_err(db_error)?;

            let is_deleted: Option<bool> = tx
                .query_opt(
                    "SELECT is_deleted FROM public.flags WHERE flag_name = $1 FOR UPDATE",
                    &[&name],
                )
                .await
                .map_err(db_error)?
                .map(|row| row.try_get(0))
                .transpose()
                .map_err(db_error)?;

            match is_deleted {
                Some(false) => {}
                _ => return Err(StoreError::not_found(name)),
            }

            tx.execute(
                "UPDATE public.flags SET is_deleted = TRUE, updated_at = $2 WHERE flag_name = $1",
                &[&name, &store_now()],
            )
            .await
            .map_err(db_error)?;

            tx.commit().await.map_err(db_error)?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, ctx))]
    async fn list_all(&self, ctx: &OpContext) -> StoreResult<Vec<Flag>> {
        ctx.run("list_all", async {
            let conn = self.get_conn().await?;
            let query = format!("SELECT {FLAG_COLUMNS} FROM public.flags ORDER BY flag_name");
            let rows = conn.query(query.as_str(), &[]).await.map_err(db_error)?;
            rows.iter().map(flag_from_row).collect()
        })
        .await
    }

    #[instrument(skip(self, ctx, names), fields(count = names.len()))]
    async fn list_by_names(&self, ctx: &OpContext, names: &[String]) -> StoreResult<Vec<Flag>> {
        ctx.run("list_by_names", async {
            let conn = self.get_conn().await?;
            let query = format!(
                "SELECT {FLAG_COLUMNS} FROM public.flags WHERE flag_name = ANY($1) ORDER BY flag_name"
            );
            let rows = conn.query(query.as_str(), &[&names]).await.map_err(db_error)?;
            rows.iter().map(flag_from_row).collect()
        })
        .await
    }

    async fn health_check(&self, ctx: &OpContext) -> StoreResult<()> {
        ctx.run("health_check", async {
            let conn = self.get_conn().await?;
            conn.query_one("SELECT 1", &[]).await.map_err(db_error)?;
            Ok(())
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::map_lookup;
    use std::collections::HashMap;

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::from_lookup(&map_lookup(HashMap::new())).expect("defaults");
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "flagkeep");
        assert_eq!(config.max_size, 16);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_db_config_overrides() {
        let vars = HashMap::from([
            ("FLAGKEEP_DB_HOST".to_string(), "db.internal".to_string()),
            ("FLAGKEEP_DB_PORT".to_string(), "6543".to_string()),
            ("FLAGKEEP_DB_POOL_SIZE".to_string(), "4".to_string()),
            ("FLAGKEEP_DB_TIMEOUT".to_string(), "3".to_string()),
        ]);
        let config = DbConfig::from_lookup(&map_lookup(vars)).expect("valid");
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 6543);
        assert_eq!(config.max_size, 4);
        assert_eq!(config.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_db_config_bad_port() {
        let vars = HashMap::from([("FLAGKEEP_DB_PORT".to_string(), "-1".to_string())]);
        assert!(DbConfig::from_lookup(&map_lookup(vars)).is_err());
    }

    #[test]
    fn test_flag_columns_order_matches_row_mapping() {
        let columns: Vec<&str> = FLAG_COLUMNS.split(',').map(str::trim).collect();
        assert_eq!(
            columns,
            vec![
                "flag_name",
                "is_deleted",
                "is_enabled",
                "active_from",
                "data",
                "default_data",
                "created_by",
                "created_at",
                "updated_at",
            ]
        );
    }
}

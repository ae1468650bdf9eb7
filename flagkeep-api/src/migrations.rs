//! Embedded schema migrations.
//!
//! Migrations are compiled into the binary and applied in version order.
//! Applied versions are recorded in `flagkeep_schema_migrations`; each
//! migration runs in its own transaction together with its bookkeeping row,
//! so a failed migration leaves neither schema changes nor a record behind.
//!
//! Deciding *what* to run is [`plan`], a pure function of the requested
//! action and the set of applied versions.

use std::collections::BTreeSet;

use deadpool_postgres::Pool;
use flagkeep_core::ConfigError;
use thiserror::Error;
use tracing::info;

/// A single reversible schema change.
#[derive(Debug, PartialEq, Eq)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub up: &'static str,
    pub down: &'static str,
}

/// Every known migration, ascending by version.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 20250908125023,
        name: "create_table_flags",
        // JSON rather than JSONB: payload key order survives storage.
        up: "CREATE TABLE IF NOT EXISTS public.flags (
                flag_name      TEXT                        NOT NULL,
                is_deleted     BOOLEAN                     NOT NULL,
                is_enabled     BOOLEAN                     NOT NULL,
                active_from    TIMESTAMP WITH TIME ZONE    NOT NULL,
                data           JSON                        NOT NULL,
                default_data   JSON                        NOT NULL,
                created_by     UUID                        NOT NULL,
                created_at     TIMESTAMP WITH TIME ZONE    NOT NULL,
                updated_at     TIMESTAMP WITH TIME ZONE    NOT NULL,
                CONSTRAINT pk_flags PRIMARY KEY (flag_name)
            );",
        down: "DROP TABLE IF EXISTS public.flags;",
    },
    Migration {
        version: 20250908135958,
        name: "seed_new_feature_rollout",
        up: r#"INSERT INTO public.flags (
                flag_name, is_deleted, is_enabled, active_from, data, default_data,
                created_by, created_at, updated_at
            ) VALUES (
                'new_feature_rollout',
                FALSE,
                TRUE,
                NOW(),
                '{"target_users": ["beta", "internal"], "percentage": 10}'::JSON,
                '{"target_users": ["all"], "percentage": 0}'::JSON,
                'a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11'::UUID,
                NOW(),
                NOW()
            );"#,
        down: "DELETE FROM public.flags WHERE flag_name = 'new_feature_rollout';",
    },
];

const BOOKKEEPING_DDL: &str = "CREATE TABLE IF NOT EXISTS flagkeep_schema_migrations (
    version     BIGINT                      PRIMARY KEY,
    name        TEXT                        NOT NULL,
    applied_at  TIMESTAMP WITH TIME ZONE    NOT NULL DEFAULT NOW()
);";

// ============================================================================
// ACTIONS AND PLANNING
// ============================================================================

/// What to do with the schema at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationAction {
    /// Apply every pending migration.
    Up,
    /// Revert the most recently applied migration.
    Down,
    /// Apply pending migrations with version <= target.
    UpTo(i64),
    /// Revert applied migrations with version > target.
    DownTo(i64),
    /// Leave the schema alone.
    Skip,
}

impl MigrationAction {
    /// Parse an action name and optional target version.
    ///
    /// `up-to` and `down-to` require a non-zero target.
    pub fn parse(action: &str, version: Option<i64>) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidValue {
            field: "FLAGKEEP_MIGRATION_ACTION".to_string(),
            value: action.to_string(),
            reason: reason.to_string(),
        };
        let target = || match version {
            Some(v) if v != 0 => Ok(v),
            _ => Err(invalid("invalid migration action: target version must be non-zero")),
        };

        match action.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "up-to" => Ok(Self::UpTo(target()?)),
            "down-to" => Ok(Self::DownTo(target()?)),
            "skip" => Ok(Self::Skip),
            _ => Err(invalid(
                "invalid migration action: expected up, down, up-to, down-to or skip",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// One migration to run in one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub migration: &'static Migration,
    pub direction: Direction,
}

/// Steps needed to carry out `action` given the applied versions, in
/// execution order.
pub fn plan(
    migrations: &'static [Migration],
    applied: &BTreeSet<i64>,
    action: MigrationAction,
) -> Vec<Step> {
    let up = |m: &'static Migration| Step {
        migration: m,
        direction: Direction::Up,
    };
    let down = |m: &'static Migration| Step {
        migration: m,
        direction: Direction::Down,
    };
    let pending = migrations.iter().filter(|m| !applied.contains(&m.version));
    let reverted = migrations.iter().rev().filter(|m| applied.contains(&m.version));

    match action {
        MigrationAction::Skip => Vec::new(),
        MigrationAction::Up => pending.map(up).collect(),
        MigrationAction::UpTo(target) => pending.filter(|m| m.version <= target).map(up).collect(),
        MigrationAction::Down => reverted.take(1).map(down).collect(),
        MigrationAction::DownTo(target) => {
            reverted.filter(|m| m.version > target).map(down).collect()
        }
    }
}

// ============================================================================
// MIGRATOR
// ============================================================================

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("migration connection error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("migration {version} ({name}) failed: {source}")]
    Step {
        version: i64,
        name: &'static str,
        source: tokio_postgres::Error,
    },
}

/// Applies [`MIGRATIONS`] against a Postgres pool.
pub struct Migrator {
    pool: Pool,
    migrations: &'static [Migration],
}

impl Migrator {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            migrations: MIGRATIONS,
        }
    }

    /// Versions recorded as applied.
    pub async fn applied_versions(&self) -> Result<BTreeSet<i64>, MigrationError> {
        let conn = self.pool.get().await?;
        conn.batch_execute(BOOKKEEPING_DDL).await?;
        let rows = conn
            .query("SELECT version FROM flagkeep_schema_migrations", &[])
            .await?;
        rows.iter()
            .map(|row| row.try_get::<_, i64>(0).map_err(MigrationError::from))
            .collect()
    }

    /// Carry out `action`, returning the steps that were run.
    pub async fn run(&self, action: MigrationAction) -> Result<Vec<Step>, MigrationError> {
        if action == MigrationAction::Skip {
            info!("Skipping schema migrations");
            return Ok(Vec::new());
        }

        let applied = self.applied_versions().await?;
        let steps = plan(self.migrations, &applied, action);
        if steps.is_empty() {
            info!(?action, "Schema is up to date");
        }

        let mut conn = self.pool.get().await?;
        for step in &steps {
            let m = step.migration;
            let step_err = |source| MigrationError::Step {
                version: m.version,
                name: m.name,
                source,
            };

            let tx = conn.transaction().await?;
            match step.direction {
                Direction::Up => {
                    tx.batch_execute(m.up).await.map_err(step_err)?;
                    tx.execute(
                        "INSERT INTO flagkeep_schema_migrations (version, name) VALUES ($1, $2)",
                        &[&m.version, &m.name],
                    )
                    .await
                    .map_err(step_err)?;
                }
                Direction::Down => {
                    tx.batch_execute(m.down).await.map_err(step_err)?;
                    tx.execute(
                        "DELETE FROM flagkeep_schema_migrations WHERE version = $1",
                        &[&m.version],
                    )
                    .await
                    .map_err(step_err)?;
                }
            }
            tx.commit().await.map_err(step_err)?;
            info!(version = m.version, name = m.name, direction = ?step.direction, "Applied migration");
        }

        Ok(steps)
    }
}

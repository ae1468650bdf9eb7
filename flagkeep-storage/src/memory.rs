//! In-memory flag repository.
//!
//! Used by tests and local development. A single async mutex over the row map
//! stands in for the relational store's row locks: every write holds it for
//! the whole "transaction", which serializes writes to the same name (and, more
//! coarsely, to every name). Access counters let tests assert whether a read
//! reached the store or was served by the cache.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use flagkeep_core::{store_now, Flag, FlagUpdate, NewFlag, OpContext, StoreError, StoreResult};
use tokio::sync::Mutex;

use crate::repository::FlagRepository;

/// Number of calls that reached the repository, per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessCounts {
    pub creates: u64,
    pub gets: u64,
    pub updates: u64,
    pub deletes: u64,
    pub list_alls: u64,
    pub list_by_names: u64,
}

impl AccessCounts {
    /// Calls that read rows.
    pub fn reads(&self) -> u64 {
        self.gets + self.list_alls + self.list_by_names
    }

    /// Calls that attempted to write rows.
    pub fn writes(&self) -> u64 {
        self.creates + self.updates + self.deletes
    }
}

#[derive(Debug, Default)]
struct Counters {
    creates: AtomicU64,
    gets: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    list_alls: AtomicU64,
    list_by_names: AtomicU64,
}

/// In-memory [`FlagRepository`] with soft-delete semantics.
#[derive(Debug, Default)]
pub struct InMemoryFlagRepository {
    rows: Mutex<BTreeMap<String, Flag>>,
    counters: Counters,
    batches: parking_lot::Mutex<Vec<Vec<String>>>,
    latency: Option<Duration>,
}

impl InMemoryFlagRepository {
    /// Create a new, empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate I/O latency inside every operation, while the row lock is
    /// held. Useful for exercising deadlines and lock contention.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Put a raw row in place, bypassing every check. Counts as no access.
    pub async fn insert_row(&self, flag: Flag) {
        self.rows.lock().await.insert(flag.name.clone(), flag);
    }

    /// Read a raw row, live or deleted. Counts as no access.
    pub async fn row(&self, name: &str) -> Option<Flag> {
        self.rows.lock().await.get(name).cloned()
    }

    /// Number of rows, including soft-deleted ones.
    pub async fn row_count(&self) -> usize {
        self.rows.lock().await.len()
    }

    /// Names passed to each `list_by_names` call, oldest first.
    pub fn batch_requests(&self) -> Vec<Vec<String>> {
        self.batches.lock().clone()
    }

    /// Snapshot of the access counters.
    pub fn access(&self) -> AccessCounts {
        let c = &self.counters;
        AccessCounts {
            creates: c.creates.load(Ordering::Relaxed),
            gets: c.gets.load(Ordering::Relaxed),
            updates: c.updates.load(Ordering::Relaxed),
            deletes: c.deletes.load(Ordering::Relaxed),
            list_alls: c.list_alls.load(Ordering::Relaxed),
            list_by_names: c.list_by_names.load(Ordering::Relaxed),
        }
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl FlagRepository for InMemoryFlagRepository {
    async fn create(&self, ctx: &OpContext, new_flag: NewFlag) -> StoreResult<Flag> {
        self.counters.creates.fetch_add(1, Ordering::Relaxed);
        ctx.run("create", async {
            let mut rows = self.rows.lock().await;
            self.simulate_latency().await;

            let now = store_now();
            match rows.get_mut(&new_flag.name) {
                Some(existing) if existing.is_live() => {
                    Err(StoreError::already_exists(&new_flag.name))
                }
                Some(existing) => {
                    existing.revive(new_flag, now);
                    Ok(existing.clone())
                }
                None => {
                    let flag = Flag::from_new(new_flag, now);
                    rows.insert(flag.name.clone(), flag.clone());
                    Ok(flag)
                }
            }
        })
        .await
    }

    async fn get_by_name(&self, ctx: &OpContext, name: &str) -> StoreResult<Flag> {
        self.counters.gets.fetch_add(1, Ordering::Relaxed);
        ctx.run("get_by_name", async {
            let rows = self.rows.lock().await;
            self.simulate_latency().await;
            rows.get(name)
                .cloned()
                .ok_or_else(|| StoreError::not_found(name))
        })
        .await
    }

    async fn update(&self, ctx: &OpContext, update: FlagUpdate) -> StoreResult<Flag> {
        self.counters.updates.fetch_add(1, Ordering::Relaxed);
        ctx.run("update", async {
            let mut rows = self.rows.lock().await;
            self.simulate_latency().await;

            let row = rows
                .get_mut(&update.name)
                .ok_or_else(|| StoreError::not_found(&update.name))?;
            if !row.is_live() {
                return Err(StoreError::deleted(&update.name));
            }
            if let Some(precondition) = &update.precondition {
                if !precondition.holds_for(row) {
                    return Err(StoreError::PreconditionFailed {
                        name: update.name.clone(),
                    });
                }
            }
            row.apply_update(&update, store_now());
            Ok(row.clone())
        })
        .await
    }

    async fn delete(&self, ctx: &OpContext, name: &str) -> StoreResult<()> {
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        ctx.run("delete", async {
            let mut rows = self.rows.lock().await;
            self.simulate_latency().await;

            match rows.get_mut(name) {
                Some(row) if row.is_live() => {
                    row.mark_deleted(store_now());
                    Ok(())
                }
                _ => Err(StoreError::not_found(name)),
            }
        })
        .await
    }

    async fn list_all(&self, ctx: &OpContext) -> StoreResult<Vec<Flag>> {
        self.counters.list_alls.fetch_add(1, Ordering::Relaxed);
        ctx.run("list_all", async {
            let rows = self.rows.lock().await;
            self.simulate_latency().await;
            Ok(rows.values().cloned().collect())
        })
        .await
    }

    async fn list_by_names(&self, ctx: &OpContext, names: &[String]) -> StoreResult<Vec<Flag>> {
        self.counters.list_by_names.fetch_add(1, Ordering::Relaxed);
        self.batches.lock().push(names.to_vec());
        ctx.run("list_by_names", async {
            let rows = self.rows.lock().await;
            self.simulate_latency().await;
            // Primary-key semantics: each existing row at most once.
            Ok(rows
                .values()
                .filter(|row| names.contains(&row.name))
                .cloned()
                .collect())
        })
        .await
    }

    async fn health_check(&self, ctx: &OpContext) -> StoreResult<()> {
        ctx.check("health_check")
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flagkeep_core::UpdatePrecondition;
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;

    fn new_flag(name: &str) -> NewFlag {
        NewFlag {
            name: name.to_string(),
            enabled: true,
            active_from: store_now(),
            data: json!({"percentage": 10}),
            default_data: json!({"percentage": 0}),
            created_by: Uuid::new_v4(),
        }
    }

    fn update_for(name: &str) -> FlagUpdate {
        FlagUpdate {
            name: name.to_string(),
            enabled: false,
            active_from: store_now(),
            data: json!({"percentage": 50}),
            default_data: json!({"percentage": 5}),
            precondition: None,
        }
    }

    #[tokio::test]
    async fn test_create_then_get() -> StoreResult<()> {
        let repo = InMemoryFlagRepository::new();
        let ctx = OpContext::background();

        let created = repo.create(&ctx, new_flag("checkout")).await?;
        let fetched = repo.get_by_name(&ctx, "checkout").await?;
        assert_eq!(created, fetched);
        assert!(fetched.is_live());
        Ok(())
    }

    #[tokio::test]
    async fn test_create_live_name_fails() -> StoreResult<()> {
        let repo = InMemoryFlagRepository::new();
        let ctx = OpContext::background();

        repo.create(&ctx, new_flag("checkout")).await?;
        let err = repo.create(&ctx, new_flag("checkout")).await;
        assert_eq!(err, Err(StoreError::already_exists("checkout")));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_revives_deleted_row() -> StoreResult<()> {
        let repo = InMemoryFlagRepository::new();
        let ctx = OpContext::background();

        repo.create(&ctx, new_flag("checkout")).await?;
        repo.delete(&ctx, "checkout").await?;

        let replacement = NewFlag {
            data: json!({"percentage": 99}),
            ..new_flag("checkout")
        };
        let revived = repo.create(&ctx, replacement).await?;

        assert!(revived.is_live());
        assert_eq!(revived.data, json!({"percentage": 99}));
        assert_eq!(repo.row_count().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_does_not_filter_deleted() -> StoreResult<()> {
        let repo = InMemoryFlagRepository::new();
        let ctx = OpContext::background();

        repo.create(&ctx, new_flag("checkout")).await?;
        repo.delete(&ctx, "checkout").await?;

        let row = repo.get_by_name(&ctx, "checkout").await?;
        assert!(row.is_deleted);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_deleted_row_fails_and_leaves_row() -> StoreResult<()> {
        let repo = InMemoryFlagRepository::new();
        let ctx = OpContext::background();

        repo.create(&ctx, new_flag("checkout")).await?;
        repo.delete(&ctx, "checkout").await?;
        let before = repo.row("checkout").await;

        let err = repo.update(&ctx, update_for("checkout")).await;
        assert_eq!(err, Err(StoreError::deleted("checkout")));
        assert_eq!(repo.row("checkout").await, before);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_found() {
        let repo = InMemoryFlagRepository::new();
        let err = repo
            .update(&OpContext::background(), update_for("ghost"))
            .await;
        assert_eq!(err, Err(StoreError::not_found("ghost")));
    }

    #[tokio::test]
    async fn test_update_precondition_checked_under_lock() -> StoreResult<()> {
        let repo = InMemoryFlagRepository::new();
        let ctx = OpContext::background();
        let created = repo.create(&ctx, new_flag("checkout")).await?;

        let mut stale = update_for("checkout");
        stale.precondition = Some(UpdatePrecondition {
            created_by: Uuid::new_v4(),
            updated_at: created.updated_at,
        });
        assert_eq!(
            repo.update(&ctx, stale).await,
            Err(StoreError::PreconditionFailed {
                name: "checkout".to_string()
            })
        );

        let mut fresh = update_for("checkout");
        fresh.precondition = Some(UpdatePrecondition {
            created_by: created.created_by,
            updated_at: created.updated_at,
        });
        let updated = repo.update(&ctx, fresh).await?;
        assert_eq!(updated.created_by, created.created_by);
        assert_eq!(updated.data, json!({"percentage": 50}));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_twice_is_not_found() -> StoreResult<()> {
        let repo = InMemoryFlagRepository::new();
        let ctx = OpContext::background();

        repo.create(&ctx, new_flag("checkout")).await?;
        repo.delete(&ctx, "checkout").await?;
        assert_eq!(
            repo.delete(&ctx, "checkout").await,
            Err(StoreError::not_found("checkout"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_list_by_names_omits_unknown() -> StoreResult<()> {
        let repo = InMemoryFlagRepository::new();
        let ctx = OpContext::background();
        repo.create(&ctx, new_flag("alpha")).await?;
        repo.create(&ctx, new_flag("beta")).await?;

        let names = vec!["alpha".to_string(), "zeta".to_string()];
        let rows = repo.list_by_names(&ctx, &names).await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "alpha");
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_creates_single_winner() {
        let repo = Arc::new(InMemoryFlagRepository::new().with_latency(Duration::from_millis(5)));

        let a = {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move { repo.create(&OpContext::background(), new_flag("race")).await })
        };
        let b = {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move { repo.create(&OpContext::background(), new_flag("race")).await })
        };

        let results = [a.await, b.await];
        let successes = results
            .iter()
            .filter(|r| matches!(r, Ok(Ok(_))))
            .count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Ok(Err(StoreError::AlreadyExists { .. }))))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(conflicts, 1);
        assert_eq!(repo.row_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_write_leaves_no_state() {
        let repo = InMemoryFlagRepository::new().with_latency(Duration::from_secs(1));
        let ctx = OpContext::with_timeout(Duration::from_millis(100));

        let result = repo.create(&ctx, new_flag("slow")).await;
        assert!(matches!(result, Err(StoreError::DeadlineExceeded { .. })));
        assert_eq!(repo.row_count().await, 0);
    }

    #[tokio::test]
    async fn test_access_counters() -> StoreResult<()> {
        let repo = InMemoryFlagRepository::new();
        let ctx = OpContext::background();
        repo.create(&ctx, new_flag("alpha")).await?;
        repo.get_by_name(&ctx, "alpha").await?;
        repo.list_all(&ctx).await?;

        let access = repo.access();
        assert_eq!(access.creates, 1);
        assert_eq!(access.gets, 1);
        assert_eq!(access.list_alls, 1);
        assert_eq!(access.reads(), 2);
        assert_eq!(access.writes(), 1);
        Ok(())
    }
}

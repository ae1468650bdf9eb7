//! Cache-aside flag store.
//!
//! Reads consult the cache first and populate it from the repository on a
//! miss. Writes go to the repository and, only once they succeed, invalidate
//! the cached entry. The store never writes a freshly written value into the
//! cache; the next read repopulates it.
//!
//! Every repository call happens before any cache operation for the same
//! request, and no cache lock is held across a repository await. A repository
//! error (including cancellation or an expired deadline) returns immediately,
//! leaving the cache exactly as it was.

use std::sync::Arc;

use flagkeep_core::{Flag, FlagUpdate, NewFlag, OpContext, StoreError, StoreResult};
use tracing::{debug, instrument, warn};

use crate::cache::{CacheStats, FlagCache};
use crate::repository::FlagRepository;

/// Cache-aside engine over a [`FlagRepository`] and a [`FlagCache`].
#[derive(Clone)]
pub struct FlagStore {
    repo: Arc<dyn FlagRepository>,
    cache: Arc<dyn FlagCache>,
}

impl std::fmt::Debug for FlagStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlagStore")
            .field("backend", &self.repo.backend_name())
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl FlagStore {
    pub fn new(repo: Arc<dyn FlagRepository>, cache: Arc<dyn FlagCache>) -> Self {
        Self { repo, cache }
    }

    pub fn repository(&self) -> &Arc<dyn FlagRepository> {
        &self.repo
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Create a flag (or revive a soft-deleted one) and drop any cached copy.
    #[instrument(skip(self, ctx, new_flag), fields(flag = %new_flag.name))]
    pub async fn create(&self, ctx: &OpContext, new_flag: NewFlag) -> StoreResult<Flag> {
        let flag = self.repo.create(ctx, new_flag).await?;
        self.invalidate(&flag.name);
        Ok(flag)
    }

    /// Fetch a live flag, serving from the cache when possible.
    #[instrument(skip(self, ctx))]
    pub async fn get_by_name(&self, ctx: &OpContext, name: &str) -> StoreResult<Flag> {
        if let Some(flag) = self.cache.get(name) {
            debug!("cache hit");
            return Ok(flag);
        }
        debug!("cache miss");

        let flag = self.repo.get_by_name(ctx, name).await?;
        if !flag.is_live() {
            return Err(StoreError::not_found(name));
        }
        self.cache.add(flag.clone());
        Ok(flag)
    }

    /// Overwrite a live flag and drop any cached copy.
    #[instrument(skip(self, ctx, update), fields(flag = %update.name))]
    pub async fn update(&self, ctx: &OpContext, update: FlagUpdate) -> StoreResult<Flag> {
        let flag = self.repo.update(ctx, update).await?;
        self.invalidate(&flag.name);
        Ok(flag)
    }

    /// Soft-delete a flag and drop any cached copy.
    #[instrument(skip(self, ctx))]
    pub async fn delete(&self, ctx: &OpContext, name: &str) -> StoreResult<()> {
        self.repo.delete(ctx, name).await?;
        self.invalidate(name);
        Ok(())
    }

    /// Every live flag, always read from the repository. Warms the cache.
    #[instrument(skip(self, ctx))]
    pub async fn list_all(&self, ctx: &OpContext) -> StoreResult<Vec<Flag>> {
        let flags: Vec<Flag> = self
            .repo
            .list_all(ctx)
            .await?
            .into_iter()
            .filter(Flag::is_live)
            .collect();

        for flag in &flags {
            self.cache.add(flag.clone());
        }
        debug!(count = flags.len(), "listed live flags");
        Ok(flags)
    }

    /// Resolve a batch of names.
    ///
    /// Duplicates collapse to their first occurrence. Cached names are served
    /// from the cache; the rest are fetched with a single repository call.
    /// Results list cache hits first, then store results. Fails with
    /// `NotFound` if nothing resolves and `UnknownNames` if only some names
    /// do. The cache is populated only when every name resolves.
    #[instrument(skip(self, ctx, names), fields(requested = names.len()))]
    pub async fn get_by_names(&self, ctx: &OpContext, names: &[String]) -> StoreResult<Vec<Flag>> {
        let requested = distinct_in_order(names);

        let mut resolved = Vec::with_capacity(requested.len());
        let mut to_fetch = Vec::new();
        for name in &requested {
            match self.cache.get(name) {
                Some(flag) => resolved.push(flag),
                None => to_fetch.push(name.clone()),
            }
        }
        debug!(hits = resolved.len(), misses = to_fetch.len(), "batch cache lookup");

        if !to_fetch.is_empty() {
            let fetched = self.repo.list_by_names(ctx, &to_fetch).await?;
            resolved.extend(fetched.into_iter().filter(Flag::is_live));
        }

        if resolved.is_empty() {
            return Err(StoreError::not_found(requested.join(", ")));
        }
        if resolved.len() < requested.len() {
            let unknown = unknown_names(&requested, &resolved);
            warn!(unknown = ?unknown, "batch request named unknown flags");
            return Err(StoreError::UnknownNames { names: unknown });
        }

        for flag in &resolved {
            self.cache.add(flag.clone());
        }
        Ok(resolved)
    }

    fn invalidate(&self, name: &str) {
        if self.cache.remove(name) {
            debug!(flag = name, "invalidated cached flag");
        }
    }
}

fn distinct_in_order(names: &[String]) -> Vec<String> {
    let mut distinct: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        if !distinct.contains(name) {
            distinct.push(name.clone());
        }
    }
    distinct
}

/// Requested names with no resolved flag, in request order.
///
/// Linear membership scan, O(requested * resolved). Batches are bounded by
/// the service's maximum batch size.
fn unknown_names(requested: &[String], resolved: &[Flag]) -> Vec<String> {
    requested
        .iter()
        .filter(|name| !resolved.iter().any(|flag| &flag.name == *name))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, ExpiringCache};
    use crate::memory::InMemoryFlagRepository;
    use flagkeep_core::{store_now, UpdatePrecondition};
    use flagkeep_test_utils::assertions::{assert_not_found, assert_unknown_names};
    use serde_json::json;
    use std::num::NonZeroUsize;
    use std::time::Duration;
    use uuid::Uuid;

    struct Harness {
        repo: Arc<InMemoryFlagRepository>,
        cache: Arc<ExpiringCache>,
        store: FlagStore,
    }

    fn harness_with(repo: InMemoryFlagRepository, ttl: Duration) -> Harness {
        let repo = Arc::new(repo);
        let capacity = NonZeroUsize::new(64).expect("non-zero");
        let cache = Arc::new(ExpiringCache::new(
            CacheConfig::new().with_capacity(capacity).with_ttl(ttl),
        ));
        let store = FlagStore::new(repo.clone(), cache.clone());
        Harness { repo, cache, store }
    }

    fn harness() -> Harness {
        harness_with(InMemoryFlagRepository::new(), Duration::from_secs(60))
    }

    fn new_flag(name: &str) -> NewFlag {
        NewFlag {
            name: name.to_string(),
            enabled: true,
            active_from: store_now(),
            data: json!({"target_users": ["beta"], "percentage": 10}),
            default_data: json!({"target_users": ["all"], "percentage": 0}),
            created_by: Uuid::new_v4(),
        }
    }

    fn update_for(name: &str, percentage: u32) -> FlagUpdate {
        FlagUpdate {
            name: name.to_string(),
            enabled: true,
            active_from: store_now(),
            data: json!({"percentage": percentage}),
            default_data: json!({"percentage": 0}),
            precondition: None,
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn test_get_populates_cache_then_hits() -> StoreResult<()> {
        let h = harness();
        let ctx = OpContext::background();
        h.store.create(&ctx, new_flag("checkout")).await?;

        let first = h.store.get_by_name(&ctx, "checkout").await?;
        let second = h.store.get_by_name(&ctx, "checkout").await?;

        assert_eq!(first, second);
        assert_eq!(h.repo.access().gets, 1);
        assert_eq!(h.cache.stats().hits, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_does_not_populate_cache() -> StoreResult<()> {
        let h = harness();
        h.store.create(&OpContext::background(), new_flag("checkout")).await?;
        assert!(h.cache.get("checkout").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_get_missing_is_not_cached() {
        let h = harness();
        let result = h.store.get_by_name(&OpContext::background(), "ghost").await;
        assert_eq!(result, Err(StoreError::not_found("ghost")));
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn test_get_deleted_row_is_not_found_and_not_cached() -> StoreResult<()> {
        let h = harness();
        let ctx = OpContext::background();
        h.store.create(&ctx, new_flag("checkout")).await?;
        h.store.delete(&ctx, "checkout").await?;

        let result = h.store.get_by_name(&ctx, "checkout").await;
        assert_eq!(result, Err(StoreError::not_found("checkout")));
        assert!(h.cache.get("checkout").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_update_invalidates_cached_entry() -> StoreResult<()> {
        let h = harness();
        let ctx = OpContext::background();
        h.store.create(&ctx, new_flag("checkout")).await?;
        h.store.get_by_name(&ctx, "checkout").await?;
        assert!(h.cache.get("checkout").is_some());

        h.store.update(&ctx, update_for("checkout", 75)).await?;
        assert!(h.cache.get("checkout").is_none());

        let fresh = h.store.get_by_name(&ctx, "checkout").await?;
        assert_eq!(fresh.data, json!({"percentage": 75}));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_invalidates_cached_entry() -> StoreResult<()> {
        let h = harness();
        let ctx = OpContext::background();
        h.store.create(&ctx, new_flag("checkout")).await?;
        h.store.get_by_name(&ctx, "checkout").await?;

        h.store.delete(&ctx, "checkout").await?;
        assert!(h.cache.get("checkout").is_none());
        assert_eq!(
            h.store.get_by_name(&ctx, "checkout").await,
            Err(StoreError::not_found("checkout"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_revive_invalidates_cached_entry() -> StoreResult<()> {
        let h = harness();
        let ctx = OpContext::background();
        h.store.create(&ctx, new_flag("checkout")).await?;
        h.store.delete(&ctx, "checkout").await?;

        // A stale live copy left by another path must not survive a revive.
        let stale = h.repo.row("checkout").await.map(|mut f| {
            f.is_deleted = false;
            f
        });
        if let Some(stale) = stale {
            h.cache.add(stale);
        }

        let revived = h
            .store
            .create(
                &ctx,
                NewFlag {
                    data: json!({"percentage": 99}),
                    ..new_flag("checkout")
                },
            )
            .await?;
        assert!(h.cache.get("checkout").is_none());
        assert_eq!(h.store.get_by_name(&ctx, "checkout").await?, revived);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_write_leaves_cache_untouched() -> StoreResult<()> {
        let h = harness();
        let ctx = OpContext::background();
        h.store.create(&ctx, new_flag("checkout")).await?;
        let cached = h.store.get_by_name(&ctx, "checkout").await?;

        let err = h.store.create(&ctx, new_flag("checkout")).await;
        assert_eq!(err, Err(StoreError::already_exists("checkout")));
        assert_eq!(h.cache.get("checkout"), Some(cached));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_deleted_flag_fails() -> StoreResult<()> {
        let h = harness();
        let ctx = OpContext::background();
        h.store.create(&ctx, new_flag("checkout")).await?;
        h.store.delete(&ctx, "checkout").await?;

        let result = h.store.update(&ctx, update_for("checkout", 5)).await;
        assert_eq!(result, Err(StoreError::deleted("checkout")));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_precondition_mismatch() -> StoreResult<()> {
        let h = harness();
        let ctx = OpContext::background();
        let created = h.store.create(&ctx, new_flag("checkout")).await?;

        let mut update = update_for("checkout", 5);
        update.precondition = Some(UpdatePrecondition {
            created_by: created.created_by,
            updated_at: created.updated_at - chrono::Duration::seconds(1),
        });
        let result = h.store.update(&ctx, update).await;
        assert!(matches!(result, Err(StoreError::PreconditionFailed { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_list_all_returns_live_and_warms_cache() -> StoreResult<()> {
        let h = harness();
        let ctx = OpContext::background();
        for name in ["alpha", "beta", "gamma"] {
            h.store.create(&ctx, new_flag(name)).await?;
        }
        h.store.delete(&ctx, "beta").await?;

        let flags = h.store.list_all(&ctx).await?;
        let listed: Vec<&str> = flags.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(listed, vec!["alpha", "gamma"]);

        for name in ["alpha", "gamma"] {
            h.store.get_by_name(&ctx, name).await?;
        }
        assert_eq!(h.repo.access().gets, 0);
        assert!(h.cache.get("beta").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_list_all_always_reads_store() -> StoreResult<()> {
        let h = harness();
        let ctx = OpContext::background();
        h.store.create(&ctx, new_flag("alpha")).await?;
        h.store.list_all(&ctx).await?;
        h.store.list_all(&ctx).await?;
        assert_eq!(h.repo.access().list_alls, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_all_empty_store() -> StoreResult<()> {
        let h = harness();
        assert!(h.store.list_all(&OpContext::background()).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_get_by_names_all_found_collapses_duplicates() -> StoreResult<()> {
        let h = harness();
        let ctx = OpContext::background();
        h.store.create(&ctx, new_flag("a")).await?;
        h.store.create(&ctx, new_flag("b")).await?;

        let flags = h.store.get_by_names(&ctx, &names(&["a", "b", "a"])).await?;
        assert_eq!(flags.len(), 2);
        assert!(h.cache.get("a").is_some());
        assert!(h.cache.get("b").is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_get_by_names_partial_reports_unknown() -> StoreResult<()> {
        let h = harness();
        let ctx = OpContext::background();
        h.store.create(&ctx, new_flag("A")).await?;
        h.store.create(&ctx, new_flag("B")).await?;
        h.store.get_by_name(&ctx, "A").await?;
        let before = h.repo.access();
        let stats_before = h.cache.stats();

        let result = h.store.get_by_names(&ctx, &names(&["A", "B", "C"])).await;
        assert_unknown_names(&result, &["C"]);

        // A came from the cache; one batch fetched only the misses.
        let after = h.repo.access();
        assert_eq!(after.list_by_names, before.list_by_names + 1);
        assert_eq!(after.gets, before.gets);
        assert_eq!(h.repo.batch_requests(), vec![names(&["B", "C"])]);
        assert_eq!(h.cache.stats().hits, stats_before.hits + 1);

        // Partial results are not cached.
        assert!(h.cache.get("B").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_get_by_names_unknown_in_request_order() -> StoreResult<()> {
        let h = harness();
        let ctx = OpContext::background();
        h.store.create(&ctx, new_flag("m")).await?;

        let result = h
            .store
            .get_by_names(&ctx, &names(&["z", "m", "a", "z"]))
            .await;
        assert_eq!(
            result,
            Err(StoreError::UnknownNames {
                names: names(&["z", "a"])
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_get_by_names_none_found() {
        let h = harness();
        let result = h
            .store
            .get_by_names(&OpContext::background(), &names(&["x", "y"]))
            .await;
        assert_not_found(&result);
    }

    #[tokio::test]
    async fn test_get_by_names_treats_deleted_as_unknown() -> StoreResult<()> {
        let h = harness();
        let ctx = OpContext::background();
        h.store.create(&ctx, new_flag("a")).await?;
        h.store.create(&ctx, new_flag("b")).await?;
        h.store.delete(&ctx, "b").await?;

        let result = h.store.get_by_names(&ctx, &names(&["a", "b"])).await;
        assert_eq!(
            result,
            Err(StoreError::UnknownNames {
                names: names(&["b"])
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_get_by_names_fetches_only_misses() -> StoreResult<()> {
        let h = harness();
        let ctx = OpContext::background();
        h.store.create(&ctx, new_flag("a")).await?;
        h.store.create(&ctx, new_flag("b")).await?;
        h.store.get_by_name(&ctx, "a").await?;

        let flags = h.store.get_by_names(&ctx, &names(&["b", "a"])).await?;
        // Cache hits come first.
        let order: Vec<&str> = flags.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);
        assert_eq!(h.repo.access().list_by_names, 1);

        // Fully cached batch never reaches the store.
        h.store.get_by_names(&ctx, &names(&["a", "b"])).await?;
        assert_eq!(h.repo.access().list_by_names, 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_entry_expires_after_ttl() -> StoreResult<()> {
        let h = harness_with(InMemoryFlagRepository::new(), Duration::from_secs(10));
        let ctx = OpContext::background();
        h.store.create(&ctx, new_flag("checkout")).await?;
        h.store.get_by_name(&ctx, "checkout").await?;

        tokio::time::advance(Duration::from_secs(11)).await;
        h.store.get_by_name(&ctx, "checkout").await?;
        assert_eq!(h.repo.access().gets, 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_update_leaves_cache_and_row() -> StoreResult<()> {
        let h = harness_with(
            InMemoryFlagRepository::new().with_latency(Duration::from_millis(200)),
            Duration::from_secs(60),
        );
        let ctx = OpContext::background();
        h.store.create(&ctx, new_flag("checkout")).await?;
        let cached = h.store.get_by_name(&ctx, "checkout").await?;

        let short = OpContext::with_timeout(Duration::from_millis(50));
        let result = h.store.update(&short, update_for("checkout", 80)).await;
        assert!(matches!(result, Err(StoreError::DeadlineExceeded { .. })));

        assert_eq!(h.cache.get("checkout"), Some(cached.clone()));
        assert_eq!(h.repo.row("checkout").await, Some(cached));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_canceled_delete_leaves_cache_and_row() -> StoreResult<()> {
        let h = harness_with(
            InMemoryFlagRepository::new().with_latency(Duration::from_millis(200)),
            Duration::from_secs(60),
        );
        let ctx = OpContext::background();
        h.store.create(&ctx, new_flag("checkout")).await?;
        h.store.get_by_name(&ctx, "checkout").await?;

        let cancel_ctx = OpContext::background();
        let canceler = cancel_ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceler.cancel();
        });

        let result = h.store.delete(&cancel_ctx, "checkout").await;
        assert_eq!(result, Err(StoreError::Canceled));
        assert!(h.cache.get("checkout").is_some());
        assert!(h.repo.row("checkout").await.is_some_and(|f| f.is_live()));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_create_race() {
        let h = harness_with(
            InMemoryFlagRepository::new().with_latency(Duration::from_millis(5)),
            Duration::from_secs(60),
        );

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let store = h.store.clone();
                tokio::spawn(async move {
                    store
                        .create(&OpContext::background(), new_flag("race"))
                        .await
                })
            })
            .collect();

        let mut successes = 0;
        let mut conflicts = 0;
        for task in tasks {
            match task.await {
                Ok(Ok(_)) => successes += 1,
                Ok(Err(StoreError::AlreadyExists { .. })) => conflicts += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!((successes, conflicts), (1, 1));
    }

    #[test]
    fn test_distinct_in_order() {
        assert_eq!(
            distinct_in_order(&names(&["b", "a", "b", "c", "a"])),
            names(&["b", "a", "c"])
        );
    }
}

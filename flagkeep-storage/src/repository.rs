//! Persistent store trait for flag rows.
//!
//! A [`FlagRepository`] is the durable source of truth behind the flag store.
//! Implementations must provide transactional, row-locked writes with
//! soft-delete semantics; the cache-aside logic lives entirely in
//! [`crate::FlagStore`].

use async_trait::async_trait;
use flagkeep_core::{Flag, FlagUpdate, NewFlag, OpContext, StoreResult};

/// Transactional CRUD over the flags table.
///
/// Every method takes the caller's [`OpContext`]; an operation aborted by its
/// context must roll back and leave no partial state. No method retries
/// internally.
#[async_trait]
pub trait FlagRepository: Send + Sync {
    /// Create a flag, or revive it in place if its row is soft-deleted.
    ///
    /// Fails with `AlreadyExists` if a live row holds the name. Two
    /// concurrent creates for the same name never both succeed.
    async fn create(&self, ctx: &OpContext, new_flag: NewFlag) -> StoreResult<Flag>;

    /// Look up a row by name, live or not. Fails with `NotFound` if no row
    /// exists.
    async fn get_by_name(&self, ctx: &OpContext, name: &str) -> StoreResult<Flag>;

    /// Overwrite the mutable fields of a live row.
    ///
    /// Fails with `NotFound` if the row is absent, `Deleted` if it is
    /// soft-deleted, and `PreconditionFailed` if the update carries a
    /// precondition the locked row does not satisfy.
    async fn update(&self, ctx: &OpContext, update: FlagUpdate) -> StoreResult<Flag>;

    /// Soft-delete a live row. Fails with `NotFound` if the row is absent or
    /// already deleted.
    async fn delete(&self, ctx: &OpContext, name: &str) -> StoreResult<()>;

    /// Every row regardless of deletion state, ordered by name.
    async fn list_all(&self, ctx: &OpContext) -> StoreResult<Vec<Flag>>;

    /// Rows for the given names. Unknown names are silently omitted; deleted
    /// rows are included.
    async fn list_by_names(&self, ctx: &OpContext, names: &[String]) -> StoreResult<Vec<Flag>>;

    /// Verify the backend is reachable.
    async fn health_check(&self, ctx: &OpContext) -> StoreResult<()>;

    /// Short backend identifier for logs and health output.
    fn backend_name(&self) -> &'static str;
}

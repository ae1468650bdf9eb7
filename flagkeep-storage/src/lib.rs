//! flagkeep storage layer.
//!
//! - [`FlagRepository`]: durable, transactional store of flag rows.
//! - [`FlagCache`] / [`ExpiringCache`]: bounded TTL cache of live flags.
//! - [`FlagStore`]: cache-aside engine combining the two.
//!
//! The Postgres-backed repository lives in `flagkeep-api`; this crate ships an
//! in-memory implementation for tests and local development.

pub mod cache;
pub mod flag_store;
pub mod memory;
pub mod repository;

pub use cache::{CacheConfig, CacheStats, ExpiringCache, FlagCache};
pub use flag_store::FlagStore;
pub use memory::{AccessCounts, InMemoryFlagRepository};
pub use repository::FlagRepository;

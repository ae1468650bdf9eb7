//! Expiring in-process cache for flag snapshots.
//!
//! The cache knows nothing about storage. Population and invalidation are
//! driven entirely by [`crate::FlagStore`].

pub mod expiring;
pub mod traits;

pub use expiring::{CacheConfig, ExpiringCache};
pub use traits::{CacheStats, FlagCache};

//! flagkeep Core - Flag Entity and Error Taxonomy
//!
//! Pure data types shared by every flagkeep crate: the [`Flag`] record and
//! its write inputs, the store error taxonomy, and the per-operation
//! [`OpContext`] carrying deadlines and cancellation.

pub mod context;
pub mod entities;
pub mod error;
pub mod identity;

pub use context::OpContext;
pub use entities::{Flag, FlagUpdate, NewFlag, UpdatePrecondition};
pub use error::{ConfigError, StoreError, StoreResult};
pub use identity::{store_now, ActorId, FlagName, Timestamp};

//! API Request and Response Types
//!
//! Wire types for the flag HTTP endpoints. The flag itself is serialized
//! straight from [`flagkeep_core::Flag`].

// Flag types
mod flag;
pub use flag::*;

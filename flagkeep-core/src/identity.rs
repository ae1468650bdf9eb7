//! Identity and time types for flag records

use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

/// Flag names are the primary identity of a flag row.
/// They are compared exactly as given: case and whitespace are significant.
pub type FlagName = String;

/// Opaque identity of whoever created a flag.
pub type ActorId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Current time at the precision the relational store keeps (microseconds).
///
/// Stores stamp `created_at`/`updated_at` with this so that a timestamp read
/// back from any backend compares equal to the one it handed out.
pub fn store_now() -> Timestamp {
    Utc::now().trunc_subsecs(6)
}

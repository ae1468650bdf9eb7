//! flagkeep Test Utilities
//!
//! Shared test infrastructure for the flagkeep workspace:
//! - Proptest generators for flags and name batches
//! - Fixtures for common scenarios
//! - Assertions over `StoreResult`

pub use flagkeep_core::{
    store_now, ActorId, Flag, FlagUpdate, NewFlag, StoreError, StoreResult, Timestamp,
    UpdatePrecondition,
};

use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating flag inputs.

    use super::*;
    use proptest::prelude::*;

    /// Generate a random UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Generate a Timestamp (DateTime<Utc>) with whole-second precision.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        // 2020-01-01 .. 2030-01-01
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    /// Generate a flag name: short, trimmed, within the default length limit.
    pub fn arb_flag_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,19}"
    }

    /// Generate a small JSON object payload.
    pub fn arb_json_payload() -> impl Strategy<Value = JsonValue> {
        let leaf = prop_oneof![
            Just(JsonValue::Null),
            any::<bool>().prop_map(JsonValue::from),
            (0u32..1000).prop_map(JsonValue::from),
            "[a-z]{0,8}".prop_map(JsonValue::from),
        ];
        prop::collection::btree_map("[a-z_]{1,10}", leaf, 0..5)
            .prop_map(|map| JsonValue::Object(map.into_iter().collect()))
    }

    /// Generate creation input for the given name.
    pub fn arb_new_flag_named(name: String) -> impl Strategy<Value = NewFlag> {
        (
            any::<bool>(),
            arb_timestamp(),
            arb_json_payload(),
            arb_json_payload(),
            arb_uuid(),
        )
            .prop_map(move |(enabled, active_from, data, default_data, created_by)| NewFlag {
                name: name.clone(),
                enabled,
                active_from,
                data,
                default_data,
                created_by,
            })
    }

    /// Generate creation input with a random name.
    pub fn arb_new_flag() -> impl Strategy<Value = NewFlag> {
        arb_flag_name().prop_flat_map(arb_new_flag_named)
    }

    /// Generate a batch request over a fixed universe of names: stored names,
    /// names never stored, and duplicates of either.
    ///
    /// Returns `(stored, request)`.
    pub fn arb_name_batch() -> impl Strategy<Value = (Vec<String>, Vec<String>)> {
        prop::collection::btree_set(arb_flag_name(), 1..12).prop_flat_map(|universe| {
            let universe: Vec<String> = universe.into_iter().collect();
            let len = universe.len();
            (
                Just(universe.clone()),
                prop::collection::vec(any::<bool>(), len),
                prop::collection::vec(prop::sample::select(universe), 1..16),
            )
                .prop_map(|(universe, stored_mask, request)| {
                    let stored = universe
                        .into_iter()
                        .zip(stored_mask)
                        .filter_map(|(name, stored)| stored.then_some(name))
                        .collect();
                    (stored, request)
                })
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built inputs for common testing scenarios.

    use super::*;

    /// Actor recorded on the seeded rollout flag.
    pub const SEED_ACTOR: &str = "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11";

    /// Creation input with fixed payloads and a fresh actor.
    pub fn sample_new_flag(name: &str) -> NewFlag {
        NewFlag {
            name: name.to_string(),
            enabled: true,
            active_from: store_now(),
            data: json!({"target_users": ["beta", "internal"], "percentage": 10}),
            default_data: json!({"target_users": ["all"], "percentage": 0}),
            created_by: Uuid::new_v4(),
        }
    }

    /// Overwrite-style update for `name` carrying `percentage` in its payload.
    pub fn sample_update(name: &str, percentage: u32) -> FlagUpdate {
        FlagUpdate {
            name: name.to_string(),
            enabled: true,
            active_from: store_now(),
            data: json!({"target_users": ["beta"], "percentage": percentage}),
            default_data: json!({"target_users": ["all"], "percentage": 0}),
            precondition: None,
        }
    }

    /// Precondition matching the current state of `flag`.
    pub fn matching_precondition(flag: &Flag) -> UpdatePrecondition {
        UpdatePrecondition {
            created_by: flag.created_by,
            updated_at: flag.updated_at,
        }
    }

    /// The flag installed by the seed migration.
    pub fn new_feature_rollout() -> NewFlag {
        NewFlag {
            name: "new_feature_rollout".to_string(),
            enabled: true,
            active_from: store_now(),
            data: json!({"target_users": ["beta", "internal"], "percentage": 10}),
            default_data: json!({"target_users": ["all"], "percentage": 0}),
            created_by: Uuid::parse_str(SEED_ACTOR).unwrap_or_else(|_| Uuid::nil()),
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over store results.

    use super::*;

    /// Assert that a StoreResult is a NotFound error.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &StoreResult<T>) {
        match result {
            Err(StoreError::NotFound { .. }) => {}
            other => panic!("Expected NotFound, got: {:?}", other),
        }
    }

    /// Assert that a StoreResult is an AlreadyExists error for `name`.
    #[track_caller]
    pub fn assert_already_exists<T: std::fmt::Debug>(result: &StoreResult<T>, name: &str) {
        match result {
            Err(StoreError::AlreadyExists { name: n }) => assert_eq!(n, name),
            other => panic!("Expected AlreadyExists for {name}, got: {:?}", other),
        }
    }

    /// Assert that a StoreResult reports exactly `expected` as unknown names.
    #[track_caller]
    pub fn assert_unknown_names<T: std::fmt::Debug>(result: &StoreResult<T>, expected: &[&str]) {
        match result {
            Err(StoreError::UnknownNames { names }) => {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                assert_eq!(names, expected, "Wrong unknown names");
            }
            other => panic!("Expected UnknownNames {:?}, got: {:?}", expected, other),
        }
    }

    /// Assert that two flags carry the same user-visible content.
    #[track_caller]
    pub fn assert_same_content(actual: &Flag, expected: &NewFlag) {
        assert_eq!(actual.name, expected.name);
        assert_eq!(actual.enabled, expected.enabled);
        assert_eq!(actual.active_from, expected.active_from);
        assert_eq!(actual.data, expected.data);
        assert_eq!(actual.default_data, expected.default_data);
        assert_eq!(actual.created_by, expected.created_by);
    }
}

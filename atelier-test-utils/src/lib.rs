//! ATELIER Test Utilities
//!
//! Shared test infrastructure for the Atelier workspace:
//! - Proptest generators for item names, target lists and entity ids
//! - Fixtures for relationship configs, seeded stores and fixed clocks
//! - Assertions over results and recorded store calls

// Re-export the in-memory store from its source crate
pub use atelier_storage::{MockStore, StoreCall, StoreOp};

// Re-export core types for convenience
pub use atelier_core::{
    AtelierConfig, AtelierError, AtelierResult, AtomicProcedure, ConfigError, EntityId,
    RelationshipConfig, StorageError, Timestamp, ValidationError,
};

use std::collections::BTreeSet;
use std::sync::Arc;

use atelier_storage::{ManualClock, RelationshipSync, TtlCache};
use chrono::{TimeZone, Utc};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for relationship inputs.

    use super::*;
    use proptest::prelude::*;

    /// A valid, already-clean item name.
    pub fn arb_item_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,11}"
    }

    /// An item name drawn from a small pool, so lists overlap often.
    pub fn arb_pooled_name() -> impl Strategy<Value = String> {
        prop::sample::select(vec![
            "rust", "go", "web", "cli", "backend", "db", "design", "ops",
        ])
        .prop_map(str::to_string)
    }

    /// A target list of up to `max` pooled names, possibly with repeats.
    pub fn arb_name_list(max: usize) -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(arb_pooled_name(), 0..=max)
    }

    /// A name that must be rejected by validation.
    pub fn arb_invalid_name() -> impl Strategy<Value = String> {
        prop_oneof![
            "[ \t]{0,4}",
            "[a-z]{51,60}",
        ]
    }

    pub fn arb_entity_id() -> impl Strategy<Value = EntityId> {
        1i64..10_000
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common testing scenarios.

    use super::*;

    /// Post ↔ tag relationship.
    pub fn tag_config() -> RelationshipConfig {
        RelationshipConfig::post_tags().expect("post_tags preset is valid")
    }

    /// Service ↔ category relationship.
    pub fn category_config() -> RelationshipConfig {
        RelationshipConfig::service_categories().expect("service_categories preset is valid")
    }

    /// The same relationship with case-folded name matching.
    pub fn case_insensitive(config: RelationshipConfig) -> RelationshipConfig {
        RelationshipConfig {
            case_sensitive: false,
            ..config
        }
    }

    pub fn sync_procedure() -> AtomicProcedure {
        AtomicProcedure::update_post_tags().expect("update_post_tags preset is valid")
    }

    /// A manual clock pinned to 2024-01-01T00:00:00Z.
    pub fn fixed_clock() -> Arc<ManualClock> {
        let start = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .expect("valid fixed timestamp");
        Arc::new(ManualClock::new(start))
    }

    /// An empty store for `config` and a sync handle over it.
    pub fn mock_sync(config: &RelationshipConfig) -> (Arc<MockStore>, RelationshipSync<MockStore>) {
        let store = Arc::new(MockStore::for_relationship(config));
        let sync = RelationshipSync::new(store.clone(), Arc::new(TtlCache::new()));
        (store, sync)
    }

    /// Like [`mock_sync`], with the atomic sync procedure registered.
    pub fn mock_sync_with_procedure(
        config: &RelationshipConfig,
    ) -> (Arc<MockStore>, RelationshipSync<MockStore>) {
        let (store, sync) = mock_sync(config);
        store
            .register_sync_procedure(&sync_procedure(), config)
            .expect("register sync procedure");
        (store, sync)
    }

    /// A store with each entity linked to its names. The call log is
    /// cleared after seeding.
    pub async fn seeded_sync(
        config: &RelationshipConfig,
        links: &[(EntityId, &[&str])],
    ) -> (Arc<MockStore>, RelationshipSync<MockStore>) {
        let (store, sync) = mock_sync_with_procedure(config);
        for (entity_id, names) in links {
            sync.add_items_to_entity(config, *entity_id, *names)
                .await
                .expect("seed links");
        }
        store.clear_calls().expect("clear seeding calls");
        (store, sync)
    }

    /// Names currently linked to `entity_id`, sorted.
    pub async fn linked_names(
        sync: &RelationshipSync<MockStore>,
        config: &RelationshipConfig,
        entity_id: EntityId,
    ) -> BTreeSet<String> {
        sync.list_items_for_entity(config, entity_id)
            .await
            .expect("list linked items")
            .into_iter()
            .map(|linked| linked.item_name)
            .collect()
    }

    /// Build a sorted name set from string literals.
    pub fn name_set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over results and recorded store calls.

    use super::*;

    /// Assert that an AtelierResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &AtelierResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that an AtelierResult is Err.
    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &AtelierResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    /// Assert that an AtelierResult is a Storage error.
    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &AtelierResult<T>) {
        match result {
            Err(AtelierError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    /// Assert that an AtelierResult is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &AtelierResult<T>) {
        match result {
            Err(AtelierError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Recorded calls as `(op, target)` pairs.
    #[track_caller]
    pub fn call_trace(store: &MockStore) -> Vec<(StoreOp, String)> {
        store
            .calls()
            .expect("read call log")
            .iter()
            .map(|call| (call.op(), call.target().to_string()))
            .collect()
    }

    /// Number of recorded `op` calls against `target`.
    #[track_caller]
    pub fn count_calls(store: &MockStore, op: StoreOp, target: &str) -> usize {
        call_trace(store)
            .into_iter()
            .filter(|(call_op, call_target)| *call_op == op && call_target == target)
            .count()
    }

    /// Assert no write (insert, delete, procedure call) was recorded.
    #[track_caller]
    pub fn assert_no_writes(store: &MockStore) {
        let writes: Vec<_> = call_trace(store)
            .into_iter()
            .filter(|(op, _)| *op != StoreOp::Select)
            .collect();
        assert!(writes.is_empty(), "Expected no writes, got: {:?}", writes);
    }
}

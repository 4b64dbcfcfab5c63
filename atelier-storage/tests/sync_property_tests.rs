//! Property-based tests for relationship sync.

use std::collections::BTreeSet;

use atelier_test_utils::assertions::*;
use atelier_test_utils::fixtures::*;
use atelier_test_utils::generators::*;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build test runtime")
}

fn as_set(names: &[String]) -> BTreeSet<String> {
    names.iter().cloned().collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// After a sync the linked names are exactly the target's distinct names.
    #[test]
    fn prop_sync_reaches_target(
        initial in arb_name_list(6),
        target in arb_name_list(6),
        entity_id in arb_entity_id(),
    ) {
        runtime().block_on(async {
            let config = tag_config();
            let initial: Vec<&str> = initial.iter().map(String::as_str).collect();
            let (_store, sync) = seeded_sync(&config, &[(entity_id, &initial[..])]).await;

            let diff = sync
                .sync_entity_items(&config, entity_id, &target)
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            prop_assert_eq!(linked_names(&sync, &config, entity_id).await, as_set(&target));
            prop_assert_eq!(diff.added.len() + diff.unchanged.len(), as_set(&target).len());
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Syncing to the same target twice writes nothing the second time.
    #[test]
    fn prop_sync_is_idempotent(
        initial in arb_name_list(6),
        target in arb_name_list(6),
    ) {
        runtime().block_on(async {
            let config = tag_config();
            let initial: Vec<&str> = initial.iter().map(String::as_str).collect();
            let (store, sync) = seeded_sync(&config, &[(1, &initial[..])]).await;

            sync.sync_entity_items(&config, 1, &target)
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            store.clear_calls().map_err(|e| TestCaseError::fail(e.to_string()))?;

            let second = sync
                .sync_entity_items(&config, 1, &target)
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            prop_assert!(second.is_noop());
            prop_assert_eq!(count_calls(&store, atelier_storage::StoreOp::Delete, "posts_tags_rel"), 0);
            prop_assert_eq!(count_calls(&store, atelier_storage::StoreOp::Insert, "posts_tags_rel"), 0);
            prop_assert_eq!(count_calls(&store, atelier_storage::StoreOp::Insert, "post_tags"), 0);
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Syncing one entity never changes another's links.
    #[test]
    fn prop_sync_leaves_other_entities_alone(
        other in arb_name_list(4),
        target in arb_name_list(6),
    ) {
        runtime().block_on(async {
            let config = tag_config();
            let other: Vec<&str> = other.iter().map(String::as_str).collect();
            let (_store, sync) = seeded_sync(&config, &[(2, &other[..])]).await;

            sync.sync_entity_items(&config, 1, &target)
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            let expected: BTreeSet<String> = other.iter().map(|s| s.to_string()).collect();
            prop_assert_eq!(linked_names(&sync, &config, 2).await, expected);
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// An atomic sync also lands exactly on the target.
    #[test]
    fn prop_atomic_sync_reaches_target(
        initial in arb_name_list(6),
        target in arb_name_list(6),
    ) {
        runtime().block_on(async {
            let config = tag_config();
            let initial: Vec<&str> = initial.iter().map(String::as_str).collect();
            let (_store, sync) = seeded_sync(&config, &[(5, &initial[..])]).await;

            sync.sync_entity_items_atomic(&config, 5, &target, &sync_procedure())
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            prop_assert_eq!(linked_names(&sync, &config, 5).await, as_set(&target));
            Ok::<(), TestCaseError>(())
        })?;
    }
}

//! End-to-end relationship scenarios against the in-memory store.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use atelier_core::{
    AtelierResult, DeleteQuery, EntityId, FilterOperator, InsertQuery, ProcedureCall,
    RelationshipConfig, Row, SelectQuery, StorageError,
};
use atelier_storage::{DataAccess, MockStore, RelationshipSync, StoreCall, StoreOp, TtlCache};
use atelier_test_utils::assertions::*;
use atelier_test_utils::fixtures::*;
use atelier_test_utils::AtelierError;
use serde_json::{json, Value};

async fn item_id(
    sync: &RelationshipSync<MockStore>,
    config: &RelationshipConfig,
    name: &str,
) -> i64 {
    sync.list_items(config)
        .await
        .unwrap()
        .into_iter()
        .find(|item| item.name == name)
        .map(|item| item.id)
        .expect("item exists")
}

// ============================================================================
// MINIMAL DIFF
// ============================================================================

#[tokio::test]
async fn test_sync_issues_only_the_diff() {
    let config = tag_config();
    let (store, sync) = seeded_sync(&config, &[(1, &["a", "b", "c"][..])]).await;

    let diff = sync
        .sync_entity_items(&config, 1, &["b", "c", "d"])
        .await
        .unwrap();

    assert_eq!(diff.added, vec!["d"]);
    assert_eq!(diff.removed, vec!["a"]);
    assert_eq!(diff.unchanged, vec!["b", "c"]);
    assert_eq!(count_calls(&store, StoreOp::Delete, "posts_tags_rel"), 1);
    assert_eq!(count_calls(&store, StoreOp::Insert, "posts_tags_rel"), 1);
    assert_eq!(count_calls(&store, StoreOp::Insert, "post_tags"), 1);
    assert_eq!(linked_names(&sync, &config, 1).await, name_set(&["b", "c", "d"]));
}

#[tokio::test]
async fn test_sync_removes_before_adding_and_touches_only_the_diff() {
    let config = tag_config();
    let (store, sync) = seeded_sync(&config, &[(1, &["a", "b", "c"][..])]).await;
    let a = item_id(&sync, &config, "a").await;
    store.clear_calls().unwrap();

    sync.sync_entity_items(&config, 1, &["b", "c", "d"])
        .await
        .unwrap();

    let trace = call_trace(&store);
    let position = |op: StoreOp, target: &str| {
        trace
            .iter()
            .position(|(call_op, call_target)| *call_op == op && call_target == target)
            .expect("call recorded")
    };
    let removal = position(StoreOp::Delete, "posts_tags_rel");
    assert!(removal < position(StoreOp::Insert, "post_tags"));
    assert!(removal < position(StoreOp::Insert, "posts_tags_rel"));

    let calls = store.calls().unwrap();
    let removed_ids = calls
        .iter()
        .find_map(|call| match call {
            StoreCall::Delete(query) => query
                .filters
                .iter()
                .find(|f| f.column.as_str() == "tag_id" && f.operator == FilterOperator::In)
                .map(|f| f.operands().to_vec()),
            _ => None,
        })
        .expect("delete filtered by tag_id");
    assert_eq!(removed_ids, vec![json!(a)]);

    let d = item_id(&sync, &config, "d").await;
    let linked_ids: Vec<Value> = calls
        .iter()
        .find_map(|call| match call {
            StoreCall::Insert(query) if query.table.as_str() == "posts_tags_rel" => {
                let column = query
                    .columns
                    .iter()
                    .position(|c| c.as_str() == "tag_id")?;
                Some(query.rows.iter().map(|row| row[column].clone()).collect())
            }
            _ => None,
        })
        .expect("relation insert with tag_id");
    assert_eq!(linked_ids, vec![json!(d)]);
}

#[tokio::test]
async fn test_sync_keeps_whitespace_variants_distinct() {
    let config = tag_config();
    let (_store, sync) = seeded_sync(&config, &[(1, &["web"][..])]).await;

    let diff = sync.sync_entity_items(&config, 1, &["web "]).await.unwrap();

    assert_eq!(diff.added, vec!["web "]);
    assert_eq!(diff.removed, vec!["web"]);
    assert!(diff.unchanged.is_empty());
    assert_eq!(linked_names(&sync, &config, 1).await, name_set(&["web "]));
    assert_eq!(sync.list_all_item_names(&config).await, vec!["web", "web "]);
}

#[tokio::test]
async fn test_sync_to_same_set_writes_nothing() {
    let config = tag_config();
    let (store, sync) = seeded_sync(&config, &[(1, &["rust", "web"][..])]).await;

    let diff = sync
        .sync_entity_items(&config, 1, &["web", "rust", "web"])
        .await
        .unwrap();

    assert!(diff.is_noop());
    assert_no_writes(&store);
}

#[tokio::test]
async fn test_sync_to_empty_target_clears_all() {
    let config = tag_config();
    let (store, sync) = seeded_sync(&config, &[(1, &["a", "b"][..]), (2, &["a"][..])]).await;

    let diff = sync
        .sync_entity_items::<&str>(&config, 1, &[])
        .await
        .unwrap();

    assert_eq!(diff.removed, vec!["a", "b"]);
    assert!(linked_names(&sync, &config, 1).await.is_empty());
    assert_eq!(linked_names(&sync, &config, 2).await, name_set(&["a"]));
    assert_eq!(count_calls(&store, StoreOp::Insert, "posts_tags_rel"), 0);
}

#[tokio::test]
async fn test_post_tags_replacement() {
    let config = tag_config();
    let (_store, sync) = seeded_sync(&config, &[(42, &["backend", "web"][..])]).await;

    let diff = sync
        .sync_entity_items(&config, 42, &["web", "cli"])
        .await
        .unwrap();

    assert_eq!(diff.added, vec!["cli"]);
    assert_eq!(diff.removed, vec!["backend"]);
    assert_eq!(diff.unchanged, vec!["web"]);
    assert_eq!(linked_names(&sync, &config, 42).await, name_set(&["cli", "web"]));

    // The removed tag itself survives; only the link goes.
    assert!(sync
        .list_all_item_names(&config)
        .await
        .contains(&"backend".to_string()));
}

#[tokio::test]
async fn test_service_categories_use_their_own_tables() {
    let config = category_config();
    let (store, sync) = mock_sync(&config);

    sync.sync_entity_items(&config, 9, &["plumbing", "electrical"])
        .await
        .unwrap();

    assert_eq!(
        linked_names(&sync, &config, 9).await,
        name_set(&["electrical", "plumbing"])
    );
    assert_eq!(count_calls(&store, StoreOp::Insert, "services_category_rel"), 1);
    assert_eq!(count_calls(&store, StoreOp::Insert, "posts_tags_rel"), 0);
}

// ============================================================================
// CASE POLICY
// ============================================================================

#[tokio::test]
async fn test_exact_names_keep_case_variants_apart() {
    let config = tag_config();
    let (store, sync) = mock_sync(&config);

    sync.sync_entity_items(&config, 1, &["Go", "go"]).await.unwrap();

    assert_eq!(store.rows(&config.items_table).unwrap().len(), 2);
    assert_eq!(linked_names(&sync, &config, 1).await, name_set(&["Go", "go"]));
}

#[tokio::test]
async fn test_case_insensitive_names_collapse() {
    let config = case_insensitive(tag_config());
    let (store, sync) = mock_sync(&config);

    sync.sync_entity_items(&config, 1, &["Go", "go"]).await.unwrap();
    assert_eq!(store.rows(&config.items_table).unwrap().len(), 1);

    // A differently-cased target is already satisfied.
    store.clear_calls().unwrap();
    let diff = sync.sync_entity_items(&config, 1, &["GO"]).await.unwrap();
    assert!(diff.is_noop());
    assert_no_writes(&store);
}

// ============================================================================
// CACHE
// ============================================================================

#[tokio::test]
async fn test_cache_refetches_after_ttl() {
    let clock = fixed_clock();
    let cache = TtlCache::with_clock(clock.clone());
    let fetches = AtomicUsize::new(0);
    let ttl = Duration::from_millis(1000);

    let counter = &fetches;
    let fetch = move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, AtelierError>(vec!["rust".to_string()])
    };

    cache.get_or_fetch("all_tags", ttl, fetch).await.unwrap();
    clock.advance(Duration::from_millis(999));
    cache.get_or_fetch("all_tags", ttl, fetch).await.unwrap();
    assert_eq!(fetches.load(Ordering::SeqCst), 1);

    clock.advance(Duration::from_millis(2));
    cache.get_or_fetch("all_tags", ttl, fetch).await.unwrap();
    assert_eq!(fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_fetch_is_not_cached() {
    let config = tag_config();
    let (store, sync) = seeded_sync(&config, &[(1, &["rust"][..])]).await;

    store.fail_next(StoreOp::Select, "post_tags").unwrap();
    assert!(sync.list_all_item_names(&config).await.is_empty());
    assert_eq!(sync.list_all_item_names(&config).await, vec!["rust"]);
    assert_eq!(sync.cache().stats().fetch_failures, 1);
}

#[tokio::test]
async fn test_failure_on_one_key_leaves_others_cached() {
    let tags = tag_config();
    let categories = category_config();
    let store = Arc::new(MockStore::with_tables(
        MockStore::relationship_schemas(&tags)
            .into_iter()
            .chain(MockStore::relationship_schemas(&categories)),
    ));
    let sync = RelationshipSync::new(store.clone(), Arc::new(TtlCache::new()));
    sync.add_items_to_entity(&categories, 1, &["plumbing"]).await.unwrap();

    assert_eq!(sync.list_all_item_names(&categories).await, vec!["plumbing"]);

    store.fail_next(StoreOp::Select, "post_tags").unwrap();
    assert!(sync.list_all_item_names(&tags).await.is_empty());

    store.clear_calls().unwrap();
    assert_eq!(sync.list_all_item_names(&categories).await, vec!["plumbing"]);
    assert!(store.calls().unwrap().is_empty());
}

#[tokio::test]
async fn test_new_items_invalidate_name_cache() {
    let config = tag_config();
    let (_store, sync) = seeded_sync(&config, &[(1, &["rust"][..])]).await;

    assert_eq!(sync.list_all_item_names(&config).await, vec!["rust"]);
    sync.sync_entity_items(&config, 1, &["rust", "go"]).await.unwrap();
    assert_eq!(sync.list_all_item_names(&config).await, vec!["go", "rust"]);
}

// ============================================================================
// PARTIAL FAILURE
// ============================================================================

#[tokio::test]
async fn test_failed_removal_still_adds() {
    let config = tag_config();
    let (store, sync) = seeded_sync(&config, &[(1, &["a", "b"][..])]).await;

    store.fail_next(StoreOp::Delete, "posts_tags_rel").unwrap();
    let result = sync.sync_entity_items(&config, 1, &["b", "c"]).await;

    assert_storage_error(&result);
    assert!(matches!(
        result,
        Err(AtelierError::Storage(StorageError::QueryFailed { .. }))
    ));
    assert_eq!(count_calls(&store, StoreOp::Insert, "posts_tags_rel"), 1);
    assert_eq!(linked_names(&sync, &config, 1).await, name_set(&["a", "b", "c"]));
}

#[tokio::test]
async fn test_failed_read_aborts_before_writes() {
    let config = tag_config();
    let (store, sync) = seeded_sync(&config, &[(1, &["a"][..])]).await;

    store.fail_next(StoreOp::Select, "posts_tags_rel").unwrap();
    let result = sync.sync_entity_items(&config, 1, &["b"]).await;

    assert_err(&result);
    assert_no_writes(&store);
    assert_eq!(linked_names(&sync, &config, 1).await, name_set(&["a"]));
}

#[tokio::test]
async fn test_invalid_target_names_are_skipped() {
    let config = tag_config();
    let (_store, sync) = mock_sync(&config);
    let too_long = "x".repeat(51);

    let result = sync
        .sync_entity_items(&config, 1, &["  ", too_long.as_str(), "rust"])
        .await;

    assert_ok(&result);
    assert_eq!(linked_names(&sync, &config, 1).await, name_set(&["rust"]));
}

// ============================================================================
// CONCURRENCY
// ============================================================================

/// Wraps a store so that a competing sync of the same entity runs right after
/// the first association read.
struct InterleavingStore {
    inner: Arc<MockStore>,
    competitor: RelationshipSync<MockStore>,
    config: RelationshipConfig,
    entity_id: EntityId,
    competing_target: Vec<String>,
    fired: AtomicBool,
}

impl InterleavingStore {
    fn new(
        inner: Arc<MockStore>,
        config: &RelationshipConfig,
        entity_id: EntityId,
        competing_target: &[&str],
    ) -> Self {
        Self {
            competitor: RelationshipSync::new(inner.clone(), Arc::new(TtlCache::new())),
            inner,
            config: config.clone(),
            entity_id,
            competing_target: competing_target.iter().map(|s| s.to_string()).collect(),
            fired: AtomicBool::new(false),
        }
    }

    fn first_time(&self) -> bool {
        !self.fired.swap(true, Ordering::SeqCst)
    }
}

#[async_trait]
impl DataAccess for InterleavingStore {
    async fn select(&self, query: &SelectQuery) -> AtelierResult<Vec<Row>> {
        let rows = self.inner.select(query).await?;
        if query.table == self.config.relations_table && self.first_time() {
            self.competitor
                .sync_entity_items(&self.config, self.entity_id, &self.competing_target)
                .await?;
        }
        Ok(rows)
    }

    async fn insert(&self, query: &InsertQuery) -> AtelierResult<u64> {
        self.inner.insert(query).await
    }

    async fn delete(&self, query: &DeleteQuery) -> AtelierResult<u64> {
        self.inner.delete(query).await
    }

    async fn call(&self, call: &ProcedureCall) -> AtelierResult<()> {
        if self.first_time() {
            self.competitor
                .sync_entity_items_atomic(
                    &self.config,
                    self.entity_id,
                    &self.competing_target,
                    &sync_procedure(),
                )
                .await?;
        }
        self.inner.call(call).await
    }
}

#[tokio::test]
async fn test_interleaved_syncs_can_match_neither_target() {
    let config = tag_config();
    let (inner, seeding) = seeded_sync(&config, &[(7, &["a"][..])]).await;
    let store = Arc::new(InterleavingStore::new(inner, &config, 7, &["c"]));
    let sync = RelationshipSync::new(store, Arc::new(TtlCache::new()));

    sync.sync_entity_items(&config, 7, &["b"]).await.unwrap();

    let linked = linked_names(&seeding, &config, 7).await;
    assert_ne!(linked, name_set(&["b"]));
    assert_ne!(linked, name_set(&["c"]));
    assert_eq!(linked, name_set(&["b", "c"]));
}

#[tokio::test]
async fn test_interleaved_atomic_syncs_converge() {
    let config = tag_config();
    let (inner, seeding) = seeded_sync(&config, &[(7, &["a"][..])]).await;
    let store = Arc::new(InterleavingStore::new(inner, &config, 7, &["c"]));
    let sync = RelationshipSync::new(store, Arc::new(TtlCache::new()));

    sync.sync_entity_items_atomic(&config, 7, &["b"], &sync_procedure())
        .await
        .unwrap();

    assert_eq!(linked_names(&seeding, &config, 7).await, name_set(&["b"]));
}

#[tokio::test]
async fn test_atomic_sync_failure_leaves_links() {
    let config = tag_config();
    let (store, sync) = seeded_sync(&config, &[(3, &["a", "b"][..])]).await;

    store.fail_next(StoreOp::Call, "update_post_tags").unwrap();
    let result = sync
        .sync_entity_items_atomic(&config, 3, &["z"], &sync_procedure())
        .await;

    assert!(matches!(
        result,
        Err(AtelierError::Storage(StorageError::ProcedureFailed { .. }))
    ));
    assert_eq!(linked_names(&sync, &config, 3).await, name_set(&["a", "b"]));
}

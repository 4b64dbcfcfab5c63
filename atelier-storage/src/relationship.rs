//! Many-to-many relationship sync.
//!
//! [`RelationshipSync`] reads and rewrites the associations between an
//! owning entity (a post, a service) and named items (tags, categories)
//! through any [`DataAccess`] handle. Table and column names come from the
//! [`RelationshipConfig`] passed to each call, so one instance serves every
//! relationship that shares a store and cache.

use std::collections::HashSet;
use std::sync::Arc;

use atelier_core::{
    validate_item_name, AtelierConfig, AtelierError, AtelierResult, AtomicProcedure, DeleteQuery,
    EntityId, Filter, Identifier, InsertQuery, Item, ItemId, LinkedItem, ProcedureCall,
    RelationshipConfig, Row, SelectQuery, StorageError, SyncDiff, ValidationError,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::{DataAccess, TtlCache};

/// Result of trying to make one item exist.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    /// The item was inserted.
    Created(String),
    /// An item with this name was already present.
    Existing(String),
    /// The name failed validation and was never sent to the store.
    Rejected { name: String, error: ValidationError },
    /// The store returned an error for this name.
    Failed { name: String, error: AtelierError },
}

impl ItemOutcome {
    pub fn name(&self) -> &str {
        match self {
            Self::Created(name) | Self::Existing(name) => name,
            Self::Rejected { name, .. } | Self::Failed { name, .. } => name,
        }
    }

    /// True when the item now exists in the store.
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Created(_) | Self::Existing(_))
    }
}

/// Association manager for many-to-many relationships.
///
/// # Concurrency
///
/// [`RelationshipSync::sync_entity_items`] is a read-diff-write sequence of
/// separate statements. Two concurrent syncs of the same entity can
/// interleave so that the final association set matches neither target.
/// Callers that need last-writer-wins semantics use
/// [`RelationshipSync::sync_entity_items_atomic`], which hands the whole
/// replacement to a server-side procedure.
pub struct RelationshipSync<D: DataAccess> {
    store: Arc<D>,
    cache: Arc<TtlCache>,
    settings: AtelierConfig,
}

impl<D: DataAccess> RelationshipSync<D> {
    /// Create a sync handle with default settings.
    pub fn new(store: Arc<D>, cache: Arc<TtlCache>) -> Self {
        Self::with_settings(store, cache, AtelierConfig::default())
    }

    pub fn with_settings(store: Arc<D>, cache: Arc<TtlCache>, settings: AtelierConfig) -> Self {
        Self {
            store,
            cache,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<D> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    pub fn settings(&self) -> &AtelierConfig {
        &self.settings
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// All item names in ascending order, cached under `config.cache_key`.
    ///
    /// A store failure is logged and yields an empty list; nothing is cached
    /// in that case, so the next call retries.
    pub async fn list_all_item_names(&self, config: &RelationshipConfig) -> Vec<String> {
        let result = self
            .cache
            .get_or_fetch(&config.cache_key, self.settings.cache_ttl, || {
                self.fetch_item_names(config)
            })
            .await;

        match result {
            Ok(names) => names,
            Err(e) => {
                error!(
                    table = %config.items_table,
                    cache_key = %config.cache_key,
                    error = %e,
                    "Failed to list item names"
                );
                Vec::new()
            }
        }
    }

    /// All items with their ids, ascending by name. Uncached.
    pub async fn list_items(&self, config: &RelationshipConfig) -> AtelierResult<Vec<Item>> {
        let query = SelectQuery::new(&config.items_table)
            .column(&config.item_pk_column)
            .column(&config.item_name_column)
            .order_by(&config.item_name_column, true);

        let rows = self.store.select(&query).await.map_err(|e| {
            error!(table = %config.items_table, error = %e, "Failed to list items");
            e
        })?;

        rows.iter()
            .map(|row| {
                Ok(Item::new(
                    row_i64(row, &config.item_pk_column, &config.items_table)?,
                    row_str(row, &config.item_name_column, &config.items_table)?,
                ))
            })
            .collect()
    }

    /// Items linked to `entity_id`, in store order.
    pub async fn list_items_for_entity(
        &self,
        config: &RelationshipConfig,
        entity_id: EntityId,
    ) -> AtelierResult<Vec<LinkedItem>> {
        let query = SelectQuery::new(&config.relations_table)
            .column(&config.item_id_column)
            .embed(config.item_embed(true))
            .filter(Filter::eq(&config.entity_id_column, entity_id));

        let rows = self.store.select(&query).await.map_err(|e| {
            error!(
                table = %config.relations_table,
                entity_id,
                error = %e,
                "Failed to fetch linked items"
            );
            e
        })?;

        rows.iter()
            .map(|row| {
                let item = embedded(row, config)?;
                Ok(LinkedItem {
                    item_id: row_i64(row, &config.item_id_column, &config.relations_table)?,
                    item_name: row_str(item, &config.item_name_column, &config.items_table)?,
                })
            })
            .collect()
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Make sure an item exists for every name.
    ///
    /// Names are validated first; invalid names are reported as `Rejected`
    /// without touching the store. Valid names are stored exactly as given,
    /// each upserted on its own so one failure does not stop the rest.
    /// Repeated names (under the config's case policy) are attempted once.
    pub async fn ensure_items_exist<S: AsRef<str> + Sync>(
        &self,
        config: &RelationshipConfig,
        names: &[S],
    ) -> Vec<ItemOutcome> {
        let mut outcomes = Vec::with_capacity(names.len());
        let mut seen = HashSet::new();

        for raw in names {
            let name = match validate_item_name(raw.as_ref(), self.settings.max_item_name_len) {
                Ok(name) => name.to_string(),
                Err(error) => {
                    warn!(
                        table = %config.items_table,
                        name = raw.as_ref(),
                        error = %error,
                        "Rejected item name"
                    );
                    outcomes.push(ItemOutcome::Rejected {
                        name: raw.as_ref().to_string(),
                        error,
                    });
                    continue;
                }
            };
            if !seen.insert(config.name_key(&name)) {
                continue;
            }

            let outcome = match self.ensure_item(config, &name).await {
                Ok(true) => ItemOutcome::Created(name),
                Ok(false) => ItemOutcome::Existing(name),
                Err(error) => {
                    error!(
                        table = %config.items_table,
                        name = %name,
                        error = %error,
                        "Failed to ensure item"
                    );
                    ItemOutcome::Failed { name, error }
                }
            };
            outcomes.push(outcome);
        }

        if outcomes
            .iter()
            .any(|outcome| matches!(outcome, ItemOutcome::Created(_)))
        {
            self.cache.invalidate(&config.cache_key);
        }

        outcomes
    }

    /// Link existing items to `entity_id` by name.
    ///
    /// Names that do not resolve to an item are skipped with a warning.
    /// Already-linked pairs are left alone. Returns the number of new links.
    pub async fn link_items_to_entity<S: AsRef<str> + Sync>(
        &self,
        config: &RelationshipConfig,
        entity_id: EntityId,
        names: &[S],
    ) -> AtelierResult<u64> {
        let names = normalize_names(config, names);
        if names.is_empty() {
            return Ok(0);
        }

        let items = self.resolve_items(config, &names).await?;
        let resolved: HashSet<String> = items.iter().map(|item| config.name_key(&item.name)).collect();
        for name in &names {
            if !resolved.contains(&config.name_key(name)) {
                warn!(
                    table = %config.items_table,
                    entity_id,
                    name = %name,
                    "Item not found; skipping link"
                );
            }
        }

        let mut seen = HashSet::new();
        let ids: Vec<ItemId> = items
            .iter()
            .map(|item| item.id)
            .filter(|id| seen.insert(*id))
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let query = ids.iter().fold(
            InsertQuery::into_table(
                &config.relations_table,
                vec![config.entity_id_column.clone(), config.item_id_column.clone()],
            )
            .on_conflict_do_nothing(vec![
                config.entity_id_column.clone(),
                config.item_id_column.clone(),
            ]),
            |query, id| query.row(vec![Value::from(entity_id), Value::from(*id)]),
        );

        let linked = self.store.insert(&query).await.map_err(|e| {
            error!(
                table = %config.relations_table,
                entity_id,
                error = %e,
                "Failed to link items"
            );
            e
        })?;
        debug!(table = %config.relations_table, entity_id, linked, "Linked items");
        Ok(linked)
    }

    /// Create any missing items, then link all of them to `entity_id`.
    ///
    /// Links are attempted even if some items failed to be created; the
    /// first such failure is returned afterwards.
    pub async fn add_items_to_entity<S: AsRef<str> + Sync>(
        &self,
        config: &RelationshipConfig,
        entity_id: EntityId,
        names: &[S],
    ) -> AtelierResult<u64> {
        let outcomes = self.ensure_items_exist(config, names).await;
        let first_failure = first_failure(outcomes);

        let linked = self.link_items_to_entity(config, entity_id, names).await?;
        match first_failure {
            Some(e) => Err(e),
            None => Ok(linked),
        }
    }

    /// Remove every association of `entity_id`. Removing nothing is fine.
    pub async fn unlink_all_from_entity(
        &self,
        config: &RelationshipConfig,
        entity_id: EntityId,
    ) -> AtelierResult<u64> {
        let query = DeleteQuery::new(&config.relations_table)
            .filter(Filter::eq(&config.entity_id_column, entity_id));

        let removed = self.store.delete(&query).await.map_err(|e| {
            error!(
                table = %config.relations_table,
                entity_id,
                error = %e,
                "Failed to unlink items"
            );
            e
        })?;
        debug!(table = %config.relations_table, entity_id, removed, "Unlinked all items");
        Ok(removed)
    }

    /// Make the items linked to `entity_id` equal `target` using the fewest
    /// writes.
    ///
    /// Only links whose names left the target are deleted, and only names new
    /// to the entity are created and linked; unchanged links are not touched.
    /// Removal runs before addition. A failed removal is logged and addition
    /// still runs; the first error is returned once both steps are done, so a
    /// partial application is possible. Failing to read the current links
    /// aborts before any write. Invalid target names are skipped with a
    /// warning and are not errors.
    ///
    /// See the type-level docs for why this is unsafe under concurrent calls
    /// for the same entity.
    pub async fn sync_entity_items<S: AsRef<str> + Sync>(
        &self,
        config: &RelationshipConfig,
        entity_id: EntityId,
        target: &[S],
    ) -> AtelierResult<SyncDiff> {
        let current = self.list_items_for_entity(config, entity_id).await?;

        let target = normalize_names(config, target);
        let target_keys: HashSet<String> = target.iter().map(|n| config.name_key(n)).collect();

        let mut current_keys = HashSet::new();
        let mut to_remove = Vec::new();
        let mut unchanged = Vec::new();
        for linked in current {
            let key = config.name_key(&linked.item_name);
            if !current_keys.insert(key.clone()) {
                continue;
            }
            if target_keys.contains(&key) {
                unchanged.push(linked.item_name);
            } else {
                to_remove.push(linked.item_name);
            }
        }
        let to_add: Vec<String> = target
            .into_iter()
            .filter(|name| !current_keys.contains(&config.name_key(name)))
            .collect();

        let mut first_error: Option<AtelierError> = None;
        let mut diff = SyncDiff {
            unchanged,
            ..SyncDiff::default()
        };

        if !to_remove.is_empty() {
            let unlinked = self.unlink_items(config, entity_id, &to_remove).await;
            match unlinked {
                Ok(_) => diff.removed = to_remove,
                Err(e) => {
                    error!(
                        table = %config.relations_table,
                        entity_id,
                        error = %e,
                        "Failed to remove stale links; continuing with additions"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        if !to_add.is_empty() {
            let outcomes = self.ensure_items_exist(config, &to_add).await;
            let present: HashSet<String> = outcomes
                .iter()
                .filter(|outcome| outcome.is_present())
                .map(|outcome| config.name_key(outcome.name()))
                .collect();
            if let Some(e) = first_failure(outcomes) {
                first_error.get_or_insert(e);
            }

            let linked = self.link_items_to_entity(config, entity_id, &to_add).await;
            match linked {
                Ok(_) => {
                    diff.added = to_add
                        .into_iter()
                        .filter(|name| present.contains(&config.name_key(name)))
                        .collect();
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(
                    table = %config.relations_table,
                    entity_id,
                    added = diff.added.len(),
                    removed = diff.removed.len(),
                    unchanged = diff.unchanged.len(),
                    "Synced entity items"
                );
                Ok(diff)
            }
        }
    }

    /// Replace the items linked to `entity_id` with `target` in one
    /// server-side transaction.
    pub async fn sync_entity_items_atomic<S: AsRef<str> + Sync>(
        &self,
        config: &RelationshipConfig,
        entity_id: EntityId,
        target: &[S],
        procedure: &AtomicProcedure,
    ) -> AtelierResult<()> {
        let names: Vec<Value> = target
            .iter()
            .map(|name| Value::String(name.as_ref().to_string()))
            .collect();
        let call = ProcedureCall::new(&procedure.name)
            .arg(&procedure.entity_param, entity_id)
            .arg(&procedure.names_param, Value::Array(names));

        self.store.call(&call).await.map_err(|e| {
            error!(
                procedure = %procedure.name,
                entity_id,
                error = %e,
                "Atomic item sync failed"
            );
            e
        })?;

        // The procedure may have created items.
        self.cache.invalidate(&config.cache_key);
        info!(procedure = %procedure.name, entity_id, "Synced entity items atomically");
        Ok(())
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    async fn fetch_item_names(&self, config: &RelationshipConfig) -> AtelierResult<Vec<String>> {
        let query = SelectQuery::new(&config.items_table)
            .column(&config.item_name_column)
            .order_by(&config.item_name_column, true);

        let rows = self.store.select(&query).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get(config.item_name_column.as_str()))
            .filter_map(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Insert one item unless present. Returns whether a row was written.
    async fn ensure_item(&self, config: &RelationshipConfig, name: &str) -> AtelierResult<bool> {
        if !config.case_sensitive {
            let existing = self
                .store
                .select(
                    &SelectQuery::new(&config.items_table)
                        .column(&config.item_pk_column)
                        .filter(Filter::in_folded(&config.item_name_column, [name])),
                )
                .await?;
            if !existing.is_empty() {
                return Ok(false);
            }
        }

        let query = InsertQuery::into_table(&config.items_table, vec![config.item_name_column.clone()])
            .row(vec![Value::from(name)])
            .on_conflict_do_nothing(vec![config.item_name_column.clone()]);
        Ok(self.store.insert(&query).await? > 0)
    }

    async fn resolve_items(
        &self,
        config: &RelationshipConfig,
        names: &[String],
    ) -> AtelierResult<Vec<Item>> {
        let filter = if config.case_sensitive {
            Filter::in_list(&config.item_name_column, names.iter().cloned())
        } else {
            Filter::in_folded(&config.item_name_column, names)
        };
        let query = SelectQuery::new(&config.items_table)
            .column(&config.item_pk_column)
            .column(&config.item_name_column)
            .filter(filter);

        let rows = self.store.select(&query).await.map_err(|e| {
            error!(table = %config.items_table, error = %e, "Failed to resolve item names");
            e
        })?;
        rows.iter()
            .map(|row| {
                Ok(Item::new(
                    row_i64(row, &config.item_pk_column, &config.items_table)?,
                    row_str(row, &config.item_name_column, &config.items_table)?,
                ))
            })
            .collect()
    }

    /// Delete this entity's links to the named items.
    async fn unlink_items(
        &self,
        config: &RelationshipConfig,
        entity_id: EntityId,
        names: &[String],
    ) -> AtelierResult<u64> {
        let ids: Vec<ItemId> = self
            .resolve_items(config, names)
            .await?
            .into_iter()
            .map(|item| item.id)
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let query = DeleteQuery::new(&config.relations_table)
            .filter(Filter::eq(&config.entity_id_column, entity_id))
            .filter(Filter::in_list(&config.item_id_column, ids));
        self.store.delete(&query).await
    }
}

/// Drop blank names and dedupe by the config's name key, keeping the first
/// spelling of each name. Names are otherwise left as given.
fn normalize_names<S: AsRef<str> + Sync>(config: &RelationshipConfig, names: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| !name.trim().is_empty())
        .filter(|name| seen.insert(config.name_key(name)))
        .map(str::to_string)
        .collect()
}

fn first_failure(outcomes: Vec<ItemOutcome>) -> Option<AtelierError> {
    outcomes.into_iter().find_map(|outcome| match outcome {
        ItemOutcome::Failed { error, .. } => Some(error),
        _ => None,
    })
}

fn embedded<'a>(row: &'a Row, config: &RelationshipConfig) -> AtelierResult<&'a Row> {
    row.get(config.foreign_table_alias.as_str())
        .and_then(Value::as_object)
        .ok_or_else(|| malformed(&config.relations_table, &config.foreign_table_alias))
}

fn row_i64(row: &Row, column: &Identifier, table: &Identifier) -> AtelierResult<i64> {
    row.get(column.as_str())
        .and_then(Value::as_i64)
        .ok_or_else(|| malformed(table, column))
}

fn row_str(row: &Row, column: &Identifier, table: &Identifier) -> AtelierResult<String> {
    row.get(column.as_str())
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| malformed(table, column))
}

fn malformed(table: &Identifier, column: &Identifier) -> AtelierError {
    StorageError::MalformedRow {
        table: table.to_string(),
        reason: format!("missing or mistyped column {}", column),
    }
    .into()
}

// ============================================================================
// TESTS
// ============================================================================

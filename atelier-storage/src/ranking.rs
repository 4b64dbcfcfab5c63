//! Most-used item ranking.

use std::collections::HashMap;

use atelier_core::{AtelierResult, RelationshipConfig, SelectQuery};
use serde_json::Value;
use tracing::error;

use crate::{DataAccess, RelationshipSync};

/// Count occurrences of each name, most frequent first. Names with equal
/// counts keep the order in which they were first seen.
pub fn tally<I, S>(names: I) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<(String, usize)> = Vec::new();
    for name in names {
        let name = name.into();
        match index.get(&name) {
            Some(&pos) => counts[pos].1 += 1,
            None => {
                index.insert(name.clone(), counts.len());
                counts.push((name, 1));
            }
        }
    }
    // Stable sort preserves first-seen order among ties.
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/// The `limit` most frequent names.
pub fn rank_by_frequency<I, S>(names: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    tally(names)
        .into_iter()
        .take(limit)
        .map(|(name, _)| name)
        .collect()
}

impl<D: DataAccess> RelationshipSync<D> {
    /// Names of the `limit` items linked most often, memoized under
    /// `cache_key`.
    ///
    /// The full tally is cached, so different limits may share a key. Ties
    /// follow the order the store returns association rows in. A store
    /// failure is logged and yields an empty list without caching.
    pub async fn most_used_items(
        &self,
        config: &RelationshipConfig,
        limit: usize,
        cache_key: &str,
    ) -> Vec<String> {
        let result = self
            .cache()
            .get_or_fetch(cache_key, self.settings().cache_ttl, || {
                self.fetch_usage_tally(config)
            })
            .await;

        match result {
            Ok(counts) => counts.into_iter().take(limit).map(|(name, _)| name).collect(),
            Err(e) => {
                error!(
                    table = %config.relations_table,
                    cache_key,
                    error = %e,
                    "Failed to rank most used items"
                );
                Vec::new()
            }
        }
    }

    async fn fetch_usage_tally(
        &self,
        config: &RelationshipConfig,
    ) -> AtelierResult<Vec<(String, usize)>> {
        let query = SelectQuery::new(&config.relations_table)
            .column(&config.item_id_column)
            .embed(config.item_embed(true));

        let rows = self.store().select(&query).await?;
        let names = rows.iter().filter_map(|row| {
            row.get(config.foreign_table_alias.as_str())
                .and_then(|item| item.get(config.item_name_column.as_str()))
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
        });
        Ok(tally(names))
    }
}

//! Core entity structures

use serde::{Deserialize, Serialize};

use crate::{EntityId, ItemId};

/// A named, reusable tag or category row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
}

impl Item {
    pub fn new(id: ItemId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A join-table row linking one entity to one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Association {
    pub entity_id: EntityId,
    pub item_id: ItemId,
}

/// An association joined with the name of its item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkedItem {
    pub item_id: ItemId,
    pub item_name: String,
}

/// What a sync changed, by item name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDiff {
    /// Names newly linked to the entity.
    pub added: Vec<String>,
    /// Names whose association was removed.
    pub removed: Vec<String>,
    /// Names present both before and after.
    pub unchanged: Vec<String>,
}

impl SyncDiff {
    /// True when the sync issued no writes.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

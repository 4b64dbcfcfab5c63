//! Relationship configuration
//!
//! A [`RelationshipConfig`] names the two tables and the columns of one
//! many-to-many relation. It is validated once, at construction; afterwards
//! every name it hands out is an [`Identifier`].

use serde::{Deserialize, Serialize};

use crate::{AtelierResult, ConfigError, Embed, Identifier};

/// Column and table names of one many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipConfig {
    /// Table holding named items (e.g. `post_tags`)
    pub items_table: Identifier,
    /// Join table (e.g. `posts_tags_rel`)
    pub relations_table: Identifier,
    /// Primary key of `items_table`
    pub item_pk_column: Identifier,
    /// Join-table column referencing `item_pk_column`
    pub item_id_column: Identifier,
    /// Name column of `items_table`
    pub item_name_column: Identifier,
    /// Join-table column referencing the owning entity
    pub entity_id_column: Identifier,
    /// Key under which the embedded item appears on a relation row
    pub foreign_table_alias: Identifier,
    /// Cache key for the "all item names" aggregate
    pub cache_key: String,
    /// Whether item names compare exactly (`true`) or case-folded
    pub case_sensitive: bool,
}

impl RelationshipConfig {
    /// Start building a config from raw names.
    pub fn builder() -> RelationshipConfigBuilder {
        RelationshipConfigBuilder::default()
    }

    /// Post ↔ tag relation.
    pub fn post_tags() -> AtelierResult<Self> {
        Self::builder()
            .items_table("post_tags")
            .relations_table("posts_tags_rel")
            .item_id_column("tag_id")
            .item_name_column("tag_name")
            .entity_id_column("post_id")
            .cache_key("all_tags")
            .build()
    }

    /// Service ↔ category relation.
    pub fn service_categories() -> AtelierResult<Self> {
        Self::builder()
            .items_table("services_category")
            .relations_table("services_category_rel")
            .item_id_column("category_id")
            .item_name_column("category_name")
            .entity_id_column("service_id")
            .cache_key("all_service_categories")
            .build()
    }

    /// The item lookup embedded into relation rows.
    pub fn item_embed(&self, inner: bool) -> Embed {
        Embed {
            table: self.items_table.clone(),
            alias: self.foreign_table_alias.clone(),
            local_column: self.item_id_column.clone(),
            foreign_column: self.item_pk_column.clone(),
            columns: vec![self.item_pk_column.clone(), self.item_name_column.clone()],
            inner,
        }
    }

    /// Comparison key for an item name under this config's case policy.
    pub fn name_key(&self, name: &str) -> String {
        if self.case_sensitive {
            name.to_string()
        } else {
            name.to_lowercase()
        }
    }
}

/// Builder for [`RelationshipConfig`]. `item_pk_column` defaults to `id`,
/// `foreign_table_alias` to the items table name and `case_sensitive` to
/// `true`.
#[derive(Debug, Clone, Default)]
pub struct RelationshipConfigBuilder {
    items_table: Option<String>,
    relations_table: Option<String>,
    item_pk_column: Option<String>,
    item_id_column: Option<String>,
    item_name_column: Option<String>,
    entity_id_column: Option<String>,
    foreign_table_alias: Option<String>,
    cache_key: Option<String>,
    case_sensitive: Option<bool>,
}

impl RelationshipConfigBuilder {
    pub fn items_table(mut self, name: impl Into<String>) -> Self {
        self.items_table = Some(name.into());
        self
    }

    pub fn relations_table(mut self, name: impl Into<String>) -> Self {
        self.relations_table = Some(name.into());
        self
    }

    pub fn item_pk_column(mut self, name: impl Into<String>) -> Self {
        self.item_pk_column = Some(name.into());
        self
    }

    pub fn item_id_column(mut self, name: impl Into<String>) -> Self {
        self.item_id_column = Some(name.into());
        self
    }

    pub fn item_name_column(mut self, name: impl Into<String>) -> Self {
        self.item_name_column = Some(name.into());
        self
    }

    pub fn entity_id_column(mut self, name: impl Into<String>) -> Self {
        self.entity_id_column = Some(name.into());
        self
    }

    pub fn foreign_table_alias(mut self, name: impl Into<String>) -> Self {
        self.foreign_table_alias = Some(name.into());
        self
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = Some(case_sensitive);
        self
    }

    /// Validate every name and produce the config.
    pub fn build(self) -> AtelierResult<RelationshipConfig> {
        let items_table = required("items_table", self.items_table)?;
        let relations_table = required("relations_table", self.relations_table)?;
        let item_id_column = required("item_id_column", self.item_id_column)?;
        let item_name_column = required("item_name_column", self.item_name_column)?;
        let entity_id_column = required("entity_id_column", self.entity_id_column)?;

        let cache_key = self.cache_key.unwrap_or_default();
        if cache_key.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "cache_key".to_string(),
            }
            .into());
        }

        if item_id_column == entity_id_column {
            return Err(ConfigError::InvalidValue {
                field: "entity_id_column".to_string(),
                value: entity_id_column,
                reason: "must differ from item_id_column".to_string(),
            }
            .into());
        }

        let foreign_table_alias = self
            .foreign_table_alias
            .unwrap_or_else(|| items_table.clone());

        Ok(RelationshipConfig {
            items_table: Identifier::new(items_table)?,
            relations_table: Identifier::new(relations_table)?,
            item_pk_column: Identifier::new(
                self.item_pk_column.unwrap_or_else(|| "id".to_string()),
            )?,
            item_id_column: Identifier::new(item_id_column)?,
            item_name_column: Identifier::new(item_name_column)?,
            entity_id_column: Identifier::new(entity_id_column)?,
            foreign_table_alias: Identifier::new(foreign_table_alias)?,
            cache_key,
            case_sensitive: self.case_sensitive.unwrap_or(true),
        })
    }
}

fn required(field: &str, value: Option<String>) -> AtelierResult<String> {
    value.ok_or_else(|| {
        ConfigError::MissingRequired {
            field: field.to_string(),
        }
        .into()
    })
}

/// Server-side procedure that replaces an entity's associations in one
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicProcedure {
    /// Procedure name
    pub name: Identifier,
    /// Keyword argument receiving the entity id
    pub entity_param: Identifier,
    /// Keyword argument receiving the full list of target names
    pub names_param: Identifier,
}

impl AtomicProcedure {
    pub fn new(
        name: impl Into<String>,
        entity_param: impl Into<String>,
        names_param: impl Into<String>,
    ) -> AtelierResult<Self> {
        Ok(Self {
            name: Identifier::new(name)?,
            entity_param: Identifier::new(entity_param)?,
            names_param: Identifier::new(names_param)?,
        })
    }

    /// `update_post_tags(post_id_param, tag_names)`.
    pub fn update_post_tags() -> AtelierResult<Self> {
        Self::new("update_post_tags", "post_id_param", "tag_names")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AtelierError, ValidationError};

    #[test]
    fn test_post_tags_preset() {
        let config = RelationshipConfig::post_tags().unwrap();
        assert_eq!(config.items_table.as_str(), "post_tags");
        assert_eq!(config.relations_table.as_str(), "posts_tags_rel");
        assert_eq!(config.item_pk_column.as_str(), "id");
        assert_eq!(config.item_id_column.as_str(), "tag_id");
        assert_eq!(config.item_name_column.as_str(), "tag_name");
        assert_eq!(config.entity_id_column.as_str(), "post_id");
        assert_eq!(config.foreign_table_alias.as_str(), "post_tags");
        assert_eq!(config.cache_key, "all_tags");
        assert!(config.case_sensitive);
    }

    #[test]
    fn test_service_categories_preset() {
        let config = RelationshipConfig::service_categories().unwrap();
        assert_eq!(config.items_table.as_str(), "services_category");
        assert_eq!(config.relations_table.as_str(), "services_category_rel");
        assert_eq!(config.entity_id_column.as_str(), "service_id");
        assert_eq!(config.foreign_table_alias.as_str(), "services_category");
    }

    #[test]
    fn test_builder_missing_field() {
        let err = RelationshipConfig::builder()
            .items_table("post_tags")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            AtelierError::Config(ConfigError::MissingRequired { ref field }) if field == "relations_table"
        ));
    }

    #[test]
    fn test_builder_rejects_bad_identifier() {
        let err = RelationshipConfig::builder()
            .items_table("post_tags; drop table posts")
            .relations_table("posts_tags_rel")
            .item_id_column("tag_id")
            .item_name_column("tag_name")
            .entity_id_column("post_id")
            .cache_key("all_tags")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            AtelierError::Validation(ValidationError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_builder_requires_cache_key() {
        let err = RelationshipConfig::builder()
            .items_table("post_tags")
            .relations_table("posts_tags_rel")
            .item_id_column("tag_id")
            .item_name_column("tag_name")
            .entity_id_column("post_id")
            .cache_key("   ")
            .build()
            .unwrap_err();
        assert!(matches!(err, AtelierError::Config(_)));
    }

    #[test]
    fn test_builder_rejects_shared_id_column() {
        let err = RelationshipConfig::builder()
            .items_table("post_tags")
            .relations_table("posts_tags_rel")
            .item_id_column("id")
            .item_name_column("tag_name")
            .entity_id_column("id")
            .cache_key("all_tags")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            AtelierError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_name_key_respects_case_policy() {
        let exact = RelationshipConfig::post_tags().unwrap();
        assert_eq!(exact.name_key("Go"), "Go");

        let folded = RelationshipConfig {
            case_sensitive: false,
            ..exact
        };
        assert_eq!(folded.name_key("Go"), "go");
    }

    #[test]
    fn test_item_embed_shape() {
        let config = RelationshipConfig::post_tags().unwrap();
        let embed = config.item_embed(true);
        assert_eq!(embed.table.as_str(), "post_tags");
        assert_eq!(embed.local_column.as_str(), "tag_id");
        assert_eq!(embed.foreign_column.as_str(), "id");
        assert_eq!(embed.columns.len(), 2);
        assert!(embed.inner);
    }

    #[test]
    fn test_update_post_tags_procedure() {
        let procedure = AtomicProcedure::update_post_tags().unwrap();
        assert_eq!(procedure.name.as_str(), "update_post_tags");
        assert_eq!(procedure.entity_param.as_str(), "post_id_param");
        assert_eq!(procedure.names_param.as_str(), "tag_names");
    }
}

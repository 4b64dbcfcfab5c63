//! Subcommand handlers.
//!
//! Handlers run against any [`DataAccess`] and return the lines to print,
//! leaving stdout to `main`.

use atelier_core::{
    AtelierConfig, AtelierError, AtelierResult, AtomicProcedure, ConfigError, EntityId,
    RelationshipConfig,
};
use atelier_storage::{CacheStats, DataAccess, ItemOutcome, RelationshipSync};
use clap::{Args, Subcommand, ValueEnum};
use tracing::debug;

/// Which relationship a command acts on.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Post tags
    Tags,
    /// Service categories
    Categories,
}

impl Kind {
    pub fn config(self, ignore_case: bool) -> AtelierResult<RelationshipConfig> {
        let config = match self {
            Self::Tags => RelationshipConfig::post_tags()?,
            Self::Categories => RelationshipConfig::service_categories()?,
        };
        Ok(RelationshipConfig {
            case_sensitive: !ignore_case,
            ..config
        })
    }

    /// Cache key for the most-used ranking.
    pub fn most_used_key(self) -> &'static str {
        match self {
            Self::Tags => "most_used_tags",
            Self::Categories => "most_used_service_categories",
        }
    }

    /// Server-side procedure for atomic replacement, where one exists.
    pub fn atomic_procedure(self) -> AtelierResult<AtomicProcedure> {
        match self {
            Self::Tags => AtomicProcedure::update_post_tags(),
            Self::Categories => Err(AtelierError::Config(ConfigError::MissingRequired {
                field: "atomic procedure for categories".to_string(),
            })),
        }
    }
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ItemsCommand {
    /// List every item name
    List,
    /// Show the items linked most often
    MostUsed {
        /// How many to show (defaults to ATELIER_MOST_USED_LIMIT)
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },
    /// Create items that do not exist yet
    Ensure {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[derive(Args, Debug, PartialEq, Eq)]
pub struct EntityArgs {
    /// Owning entity id (post or service)
    pub entity_id: EntityId,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum EntityCommand {
    /// Show the items linked to an entity
    Show(EntityArgs),
    /// Create and link items to an entity, keeping existing links
    Link {
        #[command(flatten)]
        entity: EntityArgs,
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Remove every link of an entity
    Unlink(EntityArgs),
    /// Make an entity's links equal the given names
    Sync {
        #[command(flatten)]
        entity: EntityArgs,
        /// Target names; none clears all links
        names: Vec<String>,
        /// Replace links in one server-side transaction
        #[arg(long)]
        atomic: bool,
    },
}

pub async fn run_items<D: DataAccess>(
    sync: &RelationshipSync<D>,
    kind: Kind,
    config: &RelationshipConfig,
    command: &ItemsCommand,
) -> AtelierResult<Vec<String>> {
    match command {
        ItemsCommand::List => Ok(sync.list_all_item_names(config).await),
        ItemsCommand::MostUsed { limit } => {
            let limit = limit.unwrap_or(sync.settings().most_used_limit);
            Ok(sync
                .most_used_items(config, limit, kind.most_used_key())
                .await)
        }
        ItemsCommand::Ensure { names } => {
            let outcomes = sync.ensure_items_exist(config, names).await;
            let lines = outcomes.iter().map(describe_outcome).collect();
            match outcomes.into_iter().find_map(|outcome| match outcome {
                ItemOutcome::Failed { error, .. } => Some(error),
                _ => None,
            }) {
                Some(error) => Err(error),
                None => Ok(lines),
            }
        }
    }
}

pub async fn run_entity<D: DataAccess>(
    sync: &RelationshipSync<D>,
    kind: Kind,
    config: &RelationshipConfig,
    command: &EntityCommand,
) -> AtelierResult<Vec<String>> {
    match command {
        EntityCommand::Show(EntityArgs { entity_id }) => Ok(sync
            .list_items_for_entity(config, *entity_id)
            .await?
            .into_iter()
            .map(|linked| linked.item_name)
            .collect()),
        EntityCommand::Link { entity, names } => {
            let linked = sync
                .add_items_to_entity(config, entity.entity_id, names)
                .await?;
            Ok(vec![format!("linked {}", linked)])
        }
        EntityCommand::Unlink(EntityArgs { entity_id }) => {
            let removed = sync.unlink_all_from_entity(config, *entity_id).await?;
            Ok(vec![format!("unlinked {}", removed)])
        }
        EntityCommand::Sync {
            entity,
            names,
            atomic: true,
        } => {
            let procedure = kind.atomic_procedure()?;
            sync.sync_entity_items_atomic(config, entity.entity_id, names, &procedure)
                .await?;
            Ok(vec![format!("replaced with {} item(s)", names.len())])
        }
        EntityCommand::Sync {
            entity,
            names,
            atomic: false,
        } => {
            let diff = sync
                .sync_entity_items(config, entity.entity_id, names)
                .await?;
            let mut lines = Vec::new();
            lines.extend(diff.added.iter().map(|name| format!("+ {}", name)));
            lines.extend(diff.removed.iter().map(|name| format!("- {}", name)));
            lines.extend(diff.unchanged.iter().map(|name| format!("= {}", name)));
            Ok(lines)
        }
    }
}

fn describe_outcome(outcome: &ItemOutcome) -> String {
    match outcome {
        ItemOutcome::Created(name) => format!("created {}", name),
        ItemOutcome::Existing(name) => format!("exists {}", name),
        ItemOutcome::Rejected { name, error } => format!("rejected {:?}: {}", name, error),
        ItemOutcome::Failed { name, error } => format!("failed {}: {}", name, error),
    }
}

/// Log how the aggregate cache was used during a command. Returns the
/// snapshot that was logged.
pub fn log_cache_usage<D: DataAccess>(sync: &RelationshipSync<D>) -> CacheStats {
    let stats = sync.cache().stats();
    debug!(
        hits = stats.hits,
        misses = stats.misses,
        fetch_failures = stats.fetch_failures,
        hit_rate = stats.hit_rate(),
        "Cache usage"
    );
    stats
}

/// Library settings with environment overrides, validated.
pub fn settings_from_env() -> AtelierResult<AtelierConfig> {
    let settings = AtelierConfig::from_env();
    settings.validate()?;
    Ok(settings)
}

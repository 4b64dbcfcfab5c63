//! atelier - Tag and category management for PostgreSQL
//!
//! Lists, ranks, links and syncs the many-to-many relationships between
//! posts and tags, or services and categories.
//!
//! Connection settings come from `ATELIER_DB_*`, library settings from
//! `ATELIER_CACHE_TTL_SECS`, `ATELIER_MOST_USED_LIMIT` and
//! `ATELIER_MAX_ITEM_NAME_LEN`.

use std::sync::Arc;

use atelier_core::AtelierResult;
use atelier_pg::{DbConfig, PgDataAccess};
use atelier_storage::{RelationshipSync, TtlCache};
use clap::{Parser, Subcommand};
use tracing::info;

mod commands;
mod telemetry;

use commands::{EntityCommand, ItemsCommand, Kind};
use telemetry::{init_tracing, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "atelier", author, version, about = "Manage tags and categories")]
struct Cli {
    /// Relationship to act on
    #[arg(long, value_enum, global = true, default_value_t = Kind::Tags, env = "ATELIER_KIND")]
    kind: Kind,

    /// Compare item names case-insensitively
    #[arg(long, global = true)]
    ignore_case: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the relationship tables and procedures
    Init,
    /// Item queries and maintenance
    #[command(subcommand)]
    Items(ItemsCommand),
    /// Links of one entity
    #[command(subcommand)]
    Entity(EntityCommand),
}

#[tokio::main]
async fn main() -> AtelierResult<()> {
    let cli = Cli::parse();
    init_tracing(&TelemetryConfig::from_env())?;

    let settings = commands::settings_from_env()?;
    let access = PgDataAccess::from_config(&DbConfig::from_env())?;

    let lines = match &cli.command {
        Commands::Init => {
            access.bootstrap().await?;
            info!("Schema ready");
            vec!["schema ready".to_string()]
        }
        Commands::Items(command) => {
            let config = cli.kind.config(cli.ignore_case)?;
            let sync = RelationshipSync::with_settings(
                Arc::new(access),
                Arc::new(TtlCache::new()),
                settings,
            );
            let lines = commands::run_items(&sync, cli.kind, &config, command).await?;
            commands::log_cache_usage(&sync);
            lines
        }
        Commands::Entity(command) => {
            let config = cli.kind.config(cli.ignore_case)?;
            let sync = RelationshipSync::with_settings(
                Arc::new(access),
                Arc::new(TtlCache::new()),
                settings,
            );
            let lines = commands::run_entity(&sync, cli.kind, &config, command).await?;
            commands::log_cache_usage(&sync);
            lines
        }
    };

    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_entity_sync() {
        let cli = Cli::try_parse_from([
            "atelier", "entity", "sync", "42", "web", "cli", "--atomic",
        ])
        .unwrap();
        assert_eq!(cli.kind, Kind::Tags);
        match cli.command {
            Commands::Entity(EntityCommand::Sync {
                entity,
                names,
                atomic,
            }) => {
                assert_eq!(entity.entity_id, 42);
                assert_eq!(names, vec!["web", "cli"]);
                assert!(atomic);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_sync_without_names() {
        let cli = Cli::try_parse_from(["atelier", "entity", "sync", "7"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Entity(EntityCommand::Sync { ref names, atomic: false, .. }) if names.is_empty()
        ));
    }

    #[test]
    fn test_parse_global_kind_after_subcommand() {
        let cli = Cli::try_parse_from([
            "atelier", "items", "most-used", "-n", "3", "--kind", "categories", "--ignore-case",
        ])
        .unwrap();
        assert_eq!(cli.kind, Kind::Categories);
        assert!(cli.ignore_case);
        assert_eq!(
            cli.command_items(),
            Some(&ItemsCommand::MostUsed { limit: Some(3) })
        );
    }

    #[test]
    fn test_link_requires_names() {
        assert!(Cli::try_parse_from(["atelier", "entity", "link", "1"]).is_err());
        assert!(Cli::try_parse_from(["atelier", "entity", "show", "not-a-number"]).is_err());
        assert!(Cli::try_parse_from(["atelier", "--kind", "users", "items", "list"]).is_err());
    }

    impl Cli {
        fn command_items(&self) -> Option<&ItemsCommand> {
            match &self.command {
                Commands::Items(command) => Some(command),
                _ => None,
            }
        }
    }
}

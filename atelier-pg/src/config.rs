//! Database Connection Pool Configuration
//!
//! Builds a deadpool-postgres pool from environment-driven settings.

use std::time::Duration;

use atelier_core::{AtelierError, AtelierResult, ConfigError, StorageError};
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// How long to wait for a pooled connection
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "atelier".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("ATELIER_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("ATELIER_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("ATELIER_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("ATELIER_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("ATELIER_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("ATELIER_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: std::env::var("ATELIER_DB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> AtelierResult<()> {
        if self.max_size == 0 {
            return Err(AtelierError::Config(ConfigError::InvalidValue {
                field: "max_size".to_string(),
                value: self.max_size.to_string(),
                reason: "pool size must be at least 1".to_string(),
            }));
        }
        if self.timeout.is_zero() {
            return Err(AtelierError::Config(ConfigError::InvalidValue {
                field: "timeout".to_string(),
                value: format!("{:?}", self.timeout),
                reason: "timeout must be positive".to_string(),
            }));
        }
        if self.dbname.is_empty() {
            return Err(AtelierError::Config(ConfigError::MissingRequired {
                field: "dbname".to_string(),
            }));
        }
        Ok(())
    }

    /// Create a connection pool from this configuration.
    ///
    /// No connection is opened until the pool is first used.
    pub fn create_pool(&self) -> AtelierResult<Pool> {
        self.validate()?;

        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool = PoolConfig::new(self.max_size);
        pool.timeouts.wait = Some(self.timeout);
        pool.timeouts.create = Some(self.timeout);
        cfg.pool = Some(pool);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StorageError::ConnectionFailed {
                reason: format!("Failed to create pool: {}", e),
            })?;

        Ok(pool)
    }
}

//! ATELIER-PG - PostgreSQL Data Access
//!
//! [`PgDataAccess`] implements [`DataAccess`] over a deadpool-postgres pool.
//! Queries are rendered by [`sql`] with quoted identifiers and bound
//! parameters; selected rows are decoded from one JSON column per row.
//! Driver and pool errors are converted into [`StorageError`] here, at the
//! backend boundary.

pub mod config;
pub mod sql;

pub use config::DbConfig;
pub use sql::{SqlParam, Statement};

use async_trait::async_trait;
use atelier_core::{
    AtelierError, AtelierResult, DeleteQuery, Identifier, InsertQuery, ProcedureCall, Row,
    SelectQuery, StorageError,
};
use atelier_storage::DataAccess;
use deadpool_postgres::{Pool, PoolError};
use serde_json::Value;
use tokio_postgres::error::SqlState;
use tracing::{debug, error};

/// DDL for the relationship tables and the atomic tag procedure.
pub const SCHEMA_SQL: &str = include_str!("../sql/schema.sql");

// ============================================================================
// DATA ACCESS
// ============================================================================

/// PostgreSQL-backed [`DataAccess`].
#[derive(Clone)]
pub struct PgDataAccess {
    pool: Pool,
}

impl PgDataAccess {
    /// Create a data-access handle over an existing pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a data-access handle from configuration.
    pub fn from_config(config: &DbConfig) -> AtelierResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Create the relationship tables and procedures if they are missing.
    pub async fn bootstrap(&self) -> AtelierResult<()> {
        let conn = self.get_conn().await?;
        conn.batch_execute(SCHEMA_SQL).await.map_err(|e| {
            error!(error = ?e, "Schema bootstrap failed");
            AtelierError::from(StorageError::QueryFailed {
                table: "schema".to_string(),
                reason: e.to_string(),
            })
        })
    }

    /// Get a connection from the pool.
    async fn get_conn(&self) -> AtelierResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error)
    }
}

impl std::fmt::Debug for PgDataAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgDataAccess")
            .field("pool_size", &self.pool_size())
            .finish()
    }
}

#[async_trait]
impl DataAccess for PgDataAccess {
    async fn select(&self, query: &SelectQuery) -> AtelierResult<Vec<Row>> {
        let stmt = sql::select(query)?;
        debug!(sql = %stmt.sql, "select");

        let conn = self.get_conn().await?;
        let rows = conn
            .query(stmt.sql.as_str(), &stmt.bind())
            .await
            .map_err(|e| query_error(&query.table, e))?;

        rows.iter().map(|row| decode_row(&query.table, row)).collect()
    }

    async fn insert(&self, query: &InsertQuery) -> AtelierResult<u64> {
        let Some(stmt) = sql::insert(query)? else {
            return Ok(0);
        };
        debug!(sql = %stmt.sql, "insert");

        let conn = self.get_conn().await?;
        conn.execute(stmt.sql.as_str(), &stmt.bind())
            .await
            .map_err(|e| query_error(&query.table, e))
    }

    async fn delete(&self, query: &DeleteQuery) -> AtelierResult<u64> {
        let Some(stmt) = sql::delete(query)? else {
            return Ok(0);
        };
        debug!(sql = %stmt.sql, "delete");

        let conn = self.get_conn().await?;
        conn.execute(stmt.sql.as_str(), &stmt.bind())
            .await
            .map_err(|e| query_error(&query.table, e))
    }

    async fn call(&self, call: &ProcedureCall) -> AtelierResult<()> {
        let stmt = sql::call(call)?;
        debug!(sql = %stmt.sql, "call");

        let conn = self.get_conn().await?;
        conn.execute(stmt.sql.as_str(), &stmt.bind())
            .await
            .map(|_| ())
            .map_err(|e| procedure_error(&call.name, e))
    }
}

// ============================================================================
// ERROR CONVERSION
// ============================================================================

fn decode_row(table: &Identifier, row: &tokio_postgres::Row) -> AtelierResult<Row> {
    let value: Value = row.try_get(0).map_err(|e| StorageError::MalformedRow {
        table: table.to_string(),
        reason: e.to_string(),
    })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StorageError::MalformedRow {
            table: table.to_string(),
            reason: format!("expected JSON object, got {}", other),
        }
        .into()),
    }
}

fn pool_error(err: PoolError) -> AtelierError {
    error!(error = ?err, "Connection pool error");
    StorageError::ConnectionFailed {
        reason: err.to_string(),
    }
    .into()
}

fn query_error(table: &Identifier, err: tokio_postgres::Error) -> AtelierError {
    error!(table = %table, error = ?err, "Database error");

    let Some(db) = err.as_db_error() else {
        return StorageError::ConnectionFailed {
            reason: err.to_string(),
        }
        .into();
    };

    let table = db.table().unwrap_or(table.as_str()).to_string();
    let code = db.code();
    let storage = if *code == SqlState::UNIQUE_VIOLATION {
        StorageError::UniqueViolation {
            table,
            columns: db.constraint().unwrap_or_default().to_string(),
            value: db.detail().unwrap_or_default().to_string(),
        }
    } else if *code == SqlState::UNDEFINED_TABLE {
        StorageError::UnknownTable { table }
    } else if *code == SqlState::UNDEFINED_COLUMN {
        StorageError::UnknownColumn {
            table,
            column: db.column().unwrap_or(db.message()).to_string(),
        }
    } else {
        StorageError::QueryFailed {
            table,
            reason: db.message().to_string(),
        }
    };
    storage.into()
}

fn procedure_error(name: &Identifier, err: tokio_postgres::Error) -> AtelierError {
    error!(procedure = %name, error = ?err, "Procedure error");

    let Some(db) = err.as_db_error() else {
        return StorageError::ConnectionFailed {
            reason: err.to_string(),
        }
        .into();
    };

    let storage = if *db.code() == SqlState::UNDEFINED_FUNCTION {
        StorageError::ProcedureNotFound {
            name: name.to_string(),
        }
    } else {
        StorageError::ProcedureFailed {
            name: name.to_string(),
            reason: db.message().to_string(),
        }
    };
    storage.into()
}

//! Error types for Atelier operations

use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Query on {table} failed: {reason}")]
    QueryFailed { table: String, reason: String },

    #[error("Unique constraint violated on {table} ({columns}): {value}")]
    UniqueViolation {
        table: String,
        columns: String,
        value: String,
    },

    #[error("Unknown table: {table}")]
    UnknownTable { table: String },

    #[error("Unknown column {column} on {table}")]
    UnknownColumn { table: String, column: String },

    #[error("Procedure not found: {name}")]
    ProcedureNotFound { name: String },

    #[error("Procedure {name} failed: {reason}")]
    ProcedureFailed { name: String, reason: String },

    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Malformed row from {table}: {reason}")]
    MalformedRow { table: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid identifier {identifier:?}: {reason}")]
    InvalidIdentifier { identifier: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Atelier errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AtelierError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl AtelierError {
    /// Shorthand for a failed query against `table`.
    pub fn query_failed(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Storage(StorageError::QueryFailed {
            table: table.into(),
            reason: reason.into(),
        })
    }

    /// Returns true if this error originated in the storage layer.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Result type alias for Atelier operations.
pub type AtelierResult<T> = Result<T, AtelierError>;

// =============================================================================
// TESTS
// =============================================================================

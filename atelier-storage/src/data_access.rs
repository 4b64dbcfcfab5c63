//! Async data-access trait.
//!
//! Every read and write the relationship layer performs goes through this
//! trait. Implementations translate the backend-neutral queries from
//! `atelier_core` into their own dialect and bind every operand as a
//! parameter.

use std::sync::Arc;

use ::async_trait::async_trait;
use atelier_core::{AtelierResult, DeleteQuery, InsertQuery, ProcedureCall, Row, SelectQuery};

/// Async handle to a relational store.
#[async_trait]
pub trait DataAccess: Send + Sync {
    /// Run a select. Rows are keyed by column name; an embedded row appears
    /// as a nested object under its alias.
    async fn select(&self, query: &SelectQuery) -> AtelierResult<Vec<Row>>;

    /// Run an insert and return the number of rows actually written. Rows
    /// skipped by a `DoNothing` conflict clause are not counted.
    async fn insert(&self, query: &InsertQuery) -> AtelierResult<u64>;

    /// Run a delete and return the number of rows removed.
    async fn delete(&self, query: &DeleteQuery) -> AtelierResult<u64>;

    /// Invoke a server-side procedure with keyword arguments.
    async fn call(&self, call: &ProcedureCall) -> AtelierResult<()>;
}

#[async_trait]
impl<D: DataAccess + ?Sized> DataAccess for Arc<D> {
    async fn select(&self, query: &SelectQuery) -> AtelierResult<Vec<Row>> {
        (**self).select(query).await
    }

    async fn insert(&self, query: &InsertQuery) -> AtelierResult<u64> {
        (**self).insert(query).await
    }

    async fn delete(&self, query: &DeleteQuery) -> AtelierResult<u64> {
        (**self).delete(query).await
    }

    async fn call(&self, call: &ProcedureCall) -> AtelierResult<()> {
        (**self).call(call).await
    }
}

//! SQL rendering for data-access queries.
//!
//! Every identifier is double-quoted and every value is a bound `$n`
//! parameter with an explicit cast. Selected rows come back as one JSON
//! object per row, embedded items nested under their alias, so the backend
//! decodes a single `jsonb` column regardless of the query shape.

use atelier_core::{
    AtelierResult, DeleteQuery, Filter, FilterOperator, Identifier, InsertQuery, OnConflict,
    ProcedureCall, SelectQuery, StorageError,
};
use serde_json::Value;
use tokio_postgres::types::ToSql;

/// Alias of the queried table.
const BASE: &str = "t";
/// Alias of the embedded table.
const JOINED: &str = "e";

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Int(i64),
    Text(String),
    Bool(bool),
    IntArray(Vec<i64>),
    TextArray(Vec<String>),
}

impl SqlParam {
    fn cast(&self) -> &'static str {
        match self {
            Self::Int(_) => "bigint",
            Self::Text(_) => "text",
            Self::Bool(_) => "boolean",
            Self::IntArray(_) => "bigint[]",
            Self::TextArray(_) => "text[]",
        }
    }

    pub fn as_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            Self::Int(v) => v,
            Self::Text(v) => v,
            Self::Bool(v) => v,
            Self::IntArray(v) => v,
            Self::TextArray(v) => v,
        }
    }
}

/// SQL text with its parameters in `$n` order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl Statement {
    /// Parameters in the form `tokio_postgres` expects.
    pub fn bind(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(SqlParam::as_sql).collect()
    }

    /// Bind a value, returning its placeholder with cast.
    fn push(&mut self, param: SqlParam) -> String {
        let placeholder = format!("${}::{}", self.params.len() + 1, param.cast());
        self.params.push(param);
        placeholder
    }

    /// Bind a scalar JSON value. `null` renders as the literal `NULL`.
    fn push_value(&mut self, table: &Identifier, value: &Value) -> AtelierResult<String> {
        let param = match value {
            Value::Null => return Ok("NULL".to_string()),
            Value::Bool(b) => SqlParam::Bool(*b),
            Value::String(s) => SqlParam::Text(s.clone()),
            Value::Number(n) => SqlParam::Int(n.as_i64().ok_or_else(|| {
                unsupported(table, format!("non-integer number {}", n))
            })?),
            other => return Err(unsupported(table, format!("cannot bind {}", other))),
        };
        Ok(self.push(param))
    }
}

// ============================================================================
// STATEMENTS
// ============================================================================

/// `SELECT` yielding one JSON object per row.
pub fn select(query: &SelectQuery) -> AtelierResult<Statement> {
    let mut stmt = Statement::default();

    let base = if query.columns.is_empty() {
        format!("to_jsonb({})", BASE)
    } else {
        let pairs: Vec<String> = query
            .columns
            .iter()
            .map(|c| format!("'{}', {}.{}", c, BASE, c.quoted()))
            .collect();
        format!("jsonb_build_object({})", pairs.join(", "))
    };

    let mut projection = base;
    let mut join = String::new();
    if let Some(embed) = &query.embed {
        let pairs: Vec<String> = embed
            .columns
            .iter()
            .map(|c| format!("'{}', {}.{}", c, JOINED, c.quoted()))
            .collect();
        projection = format!(
            "{} || jsonb_build_object('{}', CASE WHEN {}.{} IS NULL THEN NULL ELSE json_build_object({}) END)",
            projection,
            embed.alias,
            JOINED,
            embed.foreign_column.quoted(),
            pairs.join(", ")
        );
        join = format!(
            " {} JOIN {} AS {} ON {}.{} = {}.{}",
            if embed.inner { "INNER" } else { "LEFT" },
            embed.table.quoted(),
            JOINED,
            JOINED,
            embed.foreign_column.quoted(),
            BASE,
            embed.local_column.quoted()
        );
    }

    let mut sql = format!(
        "SELECT {} FROM {} AS {}{}",
        projection,
        query.table.quoted(),
        BASE,
        join
    );
    sql.push_str(&where_clause(&mut stmt, &query.table, &query.filters)?);
    if let Some(order) = &query.order {
        sql.push_str(&format!(
            " ORDER BY {}.{} {}",
            BASE,
            order.column.quoted(),
            if order.ascending { "ASC" } else { "DESC" }
        ));
    }

    stmt.sql = sql;
    Ok(stmt)
}

/// Multi-row `INSERT`. `None` when there are no rows.
pub fn insert(query: &InsertQuery) -> AtelierResult<Option<Statement>> {
    if query.rows.is_empty() {
        return Ok(None);
    }

    let mut stmt = Statement::default();
    let mut tuples = Vec::with_capacity(query.rows.len());
    for row in &query.rows {
        if row.len() != query.columns.len() {
            return Err(unsupported(
                &query.table,
                format!("row has {} values for {} columns", row.len(), query.columns.len()),
            ));
        }
        let values = row
            .iter()
            .map(|value| stmt.push_value(&query.table, value))
            .collect::<AtelierResult<Vec<_>>>()?;
        tuples.push(format!("({})", values.join(", ")));
    }

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        query.table.quoted(),
        quoted_list(&query.columns),
        tuples.join(", ")
    );
    if let OnConflict::DoNothing(target) = &query.on_conflict {
        if target.is_empty() {
            sql.push_str(" ON CONFLICT DO NOTHING");
        } else {
            sql.push_str(&format!(" ON CONFLICT ({}) DO NOTHING", quoted_list(target)));
        }
    }

    stmt.sql = sql;
    Ok(Some(stmt))
}

/// Filtered `DELETE`. `None` when there are no filters, so a missing filter
/// can never empty a table.
pub fn delete(query: &DeleteQuery) -> AtelierResult<Option<Statement>> {
    if query.filters.is_empty() {
        return Ok(None);
    }

    let mut stmt = Statement::default();
    let clause = where_clause(&mut stmt, &query.table, &query.filters)?;
    stmt.sql = format!("DELETE FROM {} AS {}{}", query.table.quoted(), BASE, clause);
    Ok(Some(stmt))
}

/// Procedure invocation with named arguments.
pub fn call(call: &ProcedureCall) -> AtelierResult<Statement> {
    let mut stmt = Statement::default();
    let mut args = Vec::with_capacity(call.args.len());
    for (name, value) in &call.args {
        let placeholder = match value {
            Value::Array(items) => {
                let param = array_param(&call.name, items)?;
                stmt.push(param)
            }
            scalar => stmt.push_value(&call.name, scalar)?,
        };
        args.push(format!("{} => {}", name.quoted(), placeholder));
    }
    stmt.sql = format!("SELECT {}({})", call.name.quoted(), args.join(", "));
    Ok(stmt)
}

// ============================================================================
// HELPERS
// ============================================================================

fn where_clause(
    stmt: &mut Statement,
    table: &Identifier,
    filters: &[Filter],
) -> AtelierResult<String> {
    if filters.is_empty() {
        return Ok(String::new());
    }
    let predicates = filters
        .iter()
        .map(|filter| predicate(stmt, table, filter))
        .collect::<AtelierResult<Vec<_>>>()?;
    Ok(format!(" WHERE {}", predicates.join(" AND ")))
}

fn predicate(stmt: &mut Statement, table: &Identifier, filter: &Filter) -> AtelierResult<String> {
    let column = format!("{}.{}", BASE, filter.column.quoted());
    match filter.operator {
        FilterOperator::Eq => match &filter.value {
            Value::Null => Ok(format!("{} IS NULL", column)),
            value => Ok(format!("{} = {}", column, stmt.push_value(table, value)?)),
        },
        FilterOperator::In => {
            let operands = filter.operands();
            if operands.is_empty() {
                return Ok("FALSE".to_string());
            }
            let param = array_param(table, operands)?;
            Ok(format!("{} = ANY({})", column, stmt.push(param)))
        }
        FilterOperator::InFolded => {
            let operands = filter.operands();
            if operands.is_empty() {
                return Ok("FALSE".to_string());
            }
            let names = operands
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_lowercase)
                        .ok_or_else(|| unsupported(table, format!("non-string operand {}", v)))
                })
                .collect::<AtelierResult<Vec<_>>>()?;
            Ok(format!(
                "lower({}) = ANY({})",
                column,
                stmt.push(SqlParam::TextArray(names))
            ))
        }
    }
}

/// An array parameter from homogeneous JSON values. An empty list binds as
/// `text[]`.
fn array_param(table: &Identifier, values: &[Value]) -> AtelierResult<SqlParam> {
    if values.iter().all(Value::is_string) {
        return Ok(SqlParam::TextArray(
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        ));
    }
    values
        .iter()
        .map(|v| {
            v.as_i64()
                .ok_or_else(|| unsupported(table, format!("mixed or unsupported array element {}", v)))
        })
        .collect::<AtelierResult<Vec<_>>>()
        .map(SqlParam::IntArray)
}

fn quoted_list(columns: &[Identifier]) -> String {
    columns
        .iter()
        .map(Identifier::quoted)
        .collect::<Vec<_>>()
        .join(", ")
}

fn unsupported(table: &Identifier, reason: String) -> atelier_core::AtelierError {
    StorageError::QueryFailed {
        table: table.to_string(),
        reason,
    }
    .into()
}

// ============================================================================
// TESTS
// ============================================================================

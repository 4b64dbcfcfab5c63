//! In-memory [`DataAccess`] implementation.
//!
//! `MockStore` keeps tables as vectors of JSON rows and enforces the same
//! constraints the production schema declares: serial primary keys and
//! unique keys with `ON CONFLICT DO NOTHING` semantics. Every call is
//! recorded, and faults can be injected per operation and table.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use atelier_core::{
    AtelierError, AtelierResult, AtomicProcedure, DeleteQuery, Filter, FilterOperator, Identifier,
    InsertQuery, OnConflict, ProcedureCall, RelationshipConfig, Row, SelectQuery, StorageError,
};
use serde_json::Value;

use crate::DataAccess;

/// Kind of data-access operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Select,
    Insert,
    Delete,
    Call,
}

/// A recorded data-access call.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Select(SelectQuery),
    Insert(InsertQuery),
    Delete(DeleteQuery),
    Call(ProcedureCall),
}

impl StoreCall {
    pub fn op(&self) -> StoreOp {
        match self {
            Self::Select(_) => StoreOp::Select,
            Self::Insert(_) => StoreOp::Insert,
            Self::Delete(_) => StoreOp::Delete,
            Self::Call(_) => StoreOp::Call,
        }
    }

    /// Table the call targets, or the procedure name for calls.
    pub fn target(&self) -> &str {
        match self {
            Self::Select(query) => query.table.as_str(),
            Self::Insert(query) => query.table.as_str(),
            Self::Delete(query) => query.table.as_str(),
            Self::Call(call) => call.name.as_str(),
        }
    }
}

/// Shape of a table in the mock store.
#[derive(Debug, Clone)]
pub struct TableSchema {
    name: Identifier,
    columns: Vec<Identifier>,
    serial: Option<Identifier>,
    unique_keys: Vec<Vec<Identifier>>,
}

impl TableSchema {
    pub fn new(name: &Identifier) -> Self {
        Self {
            name: name.clone(),
            columns: Vec::new(),
            serial: None,
            unique_keys: Vec::new(),
        }
    }

    pub fn column(mut self, column: &Identifier) -> Self {
        if !self.columns.contains(column) {
            self.columns.push(column.clone());
        }
        self
    }

    /// Declare an auto-incrementing integer primary key.
    pub fn serial(mut self, column: &Identifier) -> Self {
        self.serial = Some(column.clone());
        self.unique_keys.push(vec![column.clone()]);
        self.column(column)
    }

    pub fn unique(mut self, columns: Vec<Identifier>) -> Self {
        self.unique_keys.push(columns);
        self
    }
}

type Tables = HashMap<String, Table>;

type ProcedureHandler = Arc<dyn Fn(&mut Tables, &ProcedureCall) -> AtelierResult<()> + Send + Sync>;

#[derive(Debug, Clone, Default)]
struct Table {
    columns: Vec<String>,
    serial: Option<String>,
    next_serial: i64,
    unique_keys: Vec<Vec<String>>,
    rows: Vec<Row>,
}

impl Table {
    fn from_schema(schema: &TableSchema) -> Self {
        Self {
            columns: column_names(&schema.columns),
            serial: schema.serial.as_ref().map(|c| c.as_str().to_string()),
            next_serial: 0,
            unique_keys: schema.unique_keys.iter().map(|key| column_names(key)).collect(),
            rows: Vec::new(),
        }
    }

    fn check_column(&self, table: &str, column: &str) -> AtelierResult<()> {
        if self.columns.iter().any(|c| c == column) {
            Ok(())
        } else {
            Err(StorageError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            }
            .into())
        }
    }

    fn matches(&self, table: &str, row: &Row, filters: &[Filter]) -> AtelierResult<bool> {
        for filter in filters {
            self.check_column(table, filter.column.as_str())?;
            if !filter_matches(row, filter) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Insert one row with defaults applied. Returns `None` when the row was
    /// skipped by the conflict clause.
    fn insert_row(
        &mut self,
        table: &str,
        mut row: Row,
        on_conflict: &OnConflict,
    ) -> AtelierResult<Option<Row>> {
        for column in row.keys() {
            self.check_column(table, column)?;
        }
        if let Some(serial) = &self.serial {
            if !row.contains_key(serial) {
                self.next_serial += 1;
                row.insert(serial.clone(), Value::from(self.next_serial));
            }
        }

        for key in &self.unique_keys {
            let collides = self.rows.iter().any(|existing| {
                key.iter().all(|column| match (existing.get(column), row.get(column)) {
                    (Some(a), Some(b)) => !a.is_null() && a == b,
                    _ => false,
                })
            });
            if !collides {
                continue;
            }
            if let OnConflict::DoNothing(target) = on_conflict {
                if same_columns(target, key) {
                    return Ok(None);
                }
            }
            return Err(StorageError::UniqueViolation {
                table: table.to_string(),
                columns: key.join(", "),
                value: key
                    .iter()
                    .map(|column| row.get(column).map(display_value).unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join(", "),
            }
            .into());
        }

        self.rows.push(row.clone());
        Ok(Some(row))
    }
}

#[derive(Default)]
struct StoreState {
    tables: Tables,
    procedures: HashMap<String, ProcedureHandler>,
    calls: Vec<StoreCall>,
    faults: Vec<(StoreOp, String)>,
}

impl StoreState {
    /// Record a call, failing it if a matching fault is armed.
    fn record(&mut self, call: StoreCall) -> AtelierResult<()> {
        let op = call.op();
        let target = call.target().to_string();
        self.calls.push(call);

        let Some(pos) = self
            .faults
            .iter()
            .position(|(fault_op, fault_target)| *fault_op == op && *fault_target == target)
        else {
            return Ok(());
        };
        self.faults.remove(pos);

        let reason = "injected fault".to_string();
        Err(match op {
            StoreOp::Call => StorageError::ProcedureFailed {
                name: target,
                reason,
            },
            _ => StorageError::QueryFailed {
                table: target,
                reason,
            },
        }
        .into())
    }

    fn select(&self, query: &SelectQuery) -> AtelierResult<Vec<Row>> {
        let name = query.table.as_str();
        let source = table(&self.tables, name)?;
        for column in &query.columns {
            source.check_column(name, column.as_str())?;
        }
        if let Some(order) = &query.order {
            source.check_column(name, order.column.as_str())?;
        }

        let joined = match &query.embed {
            Some(embed) => {
                let joined = table(&self.tables, embed.table.as_str())?;
                source.check_column(name, embed.local_column.as_str())?;
                joined.check_column(embed.table.as_str(), embed.foreign_column.as_str())?;
                for column in &embed.columns {
                    joined.check_column(embed.table.as_str(), column.as_str())?;
                }
                Some((embed, joined))
            }
            None => None,
        };

        let mut keyed = Vec::new();
        for row in &source.rows {
            if !source.matches(name, row, &query.filters)? {
                continue;
            }

            let mut projected: Row = if query.columns.is_empty() {
                row.clone()
            } else {
                query
                    .columns
                    .iter()
                    .map(|c| (c.as_str().to_string(), cell(row, c.as_str()).clone()))
                    .collect()
            };

            if let Some((embed, joined)) = &joined {
                let local = cell(row, embed.local_column.as_str());
                let found = joined.rows.iter().find(|candidate| {
                    !local.is_null() && cell(candidate, embed.foreign_column.as_str()) == local
                });
                match found {
                    Some(found) => {
                        let nested: Row = embed
                            .columns
                            .iter()
                            .map(|c| (c.as_str().to_string(), cell(found, c.as_str()).clone()))
                            .collect();
                        projected.insert(embed.alias.as_str().to_string(), Value::Object(nested));
                    }
                    None if embed.inner => continue,
                    None => {
                        projected.insert(embed.alias.as_str().to_string(), Value::Null);
                    }
                }
            }

            let sort_key = query
                .order
                .as_ref()
                .map(|order| cell(row, order.column.as_str()).clone());
            keyed.push((sort_key, projected));
        }

        if let Some(order) = &query.order {
            keyed.sort_by(|(a, _), (b, _)| {
                let ord = compare_values(a.as_ref(), b.as_ref());
                if order.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }

        Ok(keyed.into_iter().map(|(_, row)| row).collect())
    }

    fn insert(&mut self, query: &InsertQuery) -> AtelierResult<u64> {
        let name = query.table.as_str();
        let mut staged = table(&self.tables, name)?.clone();
        for column in &query.columns {
            staged.check_column(name, column.as_str())?;
        }

        let mut inserted = 0;
        for row in query.keyed_rows() {
            if staged.insert_row(name, row, &query.on_conflict)?.is_some() {
                inserted += 1;
            }
        }

        self.tables.insert(name.to_string(), staged);
        Ok(inserted)
    }

    fn delete(&mut self, query: &DeleteQuery) -> AtelierResult<u64> {
        let name = query.table.as_str();
        let table = table_mut(&mut self.tables, name)?;
        if query.filters.is_empty() {
            return Ok(0);
        }
        for filter in &query.filters {
            table.check_column(name, filter.column.as_str())?;
        }

        let before = table.rows.len();
        table
            .rows
            .retain(|row| !query.filters.iter().all(|filter| filter_matches(row, filter)));
        Ok((before - table.rows.len()) as u64)
    }

    fn call(&mut self, call: &ProcedureCall) -> AtelierResult<()> {
        let handler = self.procedures.get(call.name.as_str()).cloned().ok_or_else(|| {
            AtelierError::from(StorageError::ProcedureNotFound {
                name: call.name.as_str().to_string(),
            })
        })?;

        // Procedures run against a copy that is committed only on success.
        let mut staged = self.tables.clone();
        handler(&mut staged, call)?;
        self.tables = staged;
        Ok(())
    }
}

/// In-memory relational store with call recording and fault injection.
///
/// Clones share the same underlying tables.
#[derive(Clone, Default)]
pub struct MockStore {
    state: Arc<RwLock<StoreState>>,
}

impl std::fmt::Debug for MockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStore").finish_non_exhaustive()
    }
}

impl MockStore {
    /// Create an empty store with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with the given tables.
    pub fn with_tables(schemas: impl IntoIterator<Item = TableSchema>) -> Self {
        let tables = schemas
            .into_iter()
            .map(|schema| (schema.name.as_str().to_string(), Table::from_schema(&schema)))
            .collect();
        Self {
            state: Arc::new(RwLock::new(StoreState {
                tables,
                ..StoreState::default()
            })),
        }
    }

    /// Create the items and relations tables of one relationship.
    ///
    /// Items get a serial primary key and a unique name; relations get a
    /// unique `(entity, item)` pair.
    pub fn for_relationship(config: &RelationshipConfig) -> Self {
        Self::with_tables(Self::relationship_schemas(config))
    }

    /// Table schemas for one relationship.
    pub fn relationship_schemas(config: &RelationshipConfig) -> [TableSchema; 2] {
        [
            TableSchema::new(&config.items_table)
                .serial(&config.item_pk_column)
                .column(&config.item_name_column)
                .unique(vec![config.item_name_column.clone()]),
            TableSchema::new(&config.relations_table)
                .column(&config.entity_id_column)
                .column(&config.item_id_column)
                .unique(vec![
                    config.entity_id_column.clone(),
                    config.item_id_column.clone(),
                ]),
        ]
    }

    /// Register a procedure that replaces an entity's associations with the
    /// given names, creating missing items, as one unit.
    pub fn register_sync_procedure(
        &self,
        procedure: &AtomicProcedure,
        config: &RelationshipConfig,
    ) -> AtelierResult<()> {
        let procedure_ref = procedure.clone();
        let config = config.clone();
        let handler: ProcedureHandler = Arc::new(move |tables: &mut Tables, call: &ProcedureCall| {
            run_sync_procedure(tables, &procedure_ref, &config, call)
        });
        self.write()?
            .procedures
            .insert(procedure.name.as_str().to_string(), handler);
        Ok(())
    }

    /// Make the next `op` against `target` (table or procedure name) fail.
    pub fn fail_next(&self, op: StoreOp, target: &str) -> AtelierResult<()> {
        self.write()?.faults.push((op, target.to_string()));
        Ok(())
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> AtelierResult<Vec<StoreCall>> {
        Ok(self.read()?.calls.clone())
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) -> AtelierResult<()> {
        self.write()?.calls.clear();
        Ok(())
    }

    /// Snapshot of a table's rows in insertion order.
    pub fn rows(&self, table: &Identifier) -> AtelierResult<Vec<Row>> {
        let state = self.read()?;
        Ok(self::table(&state.tables, table.as_str())?.rows.clone())
    }

    fn read(&self) -> AtelierResult<std::sync::RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|_| AtelierError::from(StorageError::LockPoisoned))
    }

    fn write(&self) -> AtelierResult<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|_| AtelierError::from(StorageError::LockPoisoned))
    }
}

#[async_trait]
impl DataAccess for MockStore {
    async fn select(&self, query: &SelectQuery) -> AtelierResult<Vec<Row>> {
        let mut state = self.write()?;
        state.record(StoreCall::Select(query.clone()))?;
        state.select(query)
    }

    async fn insert(&self, query: &InsertQuery) -> AtelierResult<u64> {
        let mut state = self.write()?;
        state.record(StoreCall::Insert(query.clone()))?;
        state.insert(query)
    }

    async fn delete(&self, query: &DeleteQuery) -> AtelierResult<u64> {
        let mut state = self.write()?;
        state.record(StoreCall::Delete(query.clone()))?;
        state.delete(query)
    }

    async fn call(&self, call: &ProcedureCall) -> AtelierResult<()> {
        let mut state = self.write()?;
        state.record(StoreCall::Call(call.clone()))?;
        state.call(call)
    }
}

fn run_sync_procedure(
    tables: &mut Tables,
    procedure: &AtomicProcedure,
    config: &RelationshipConfig,
    call: &ProcedureCall,
) -> AtelierResult<()> {
    let failed = |reason: String| {
        AtelierError::from(StorageError::ProcedureFailed {
            name: procedure.name.as_str().to_string(),
            reason,
        })
    };

    let entity_id = call
        .get(procedure.entity_param.as_str())
        .and_then(Value::as_i64)
        .ok_or_else(|| failed(format!("missing integer argument {}", procedure.entity_param)))?;
    let names: Vec<String> = call
        .get(procedure.names_param.as_str())
        .and_then(Value::as_array)
        .ok_or_else(|| failed(format!("missing array argument {}", procedure.names_param)))?
        .iter()
        .filter_map(|name| name.as_str().map(str::to_string))
        .collect();

    let items_name = config.items_table.as_str();
    let relations_name = config.relations_table.as_str();
    let pk = config.item_pk_column.as_str();
    let name_column = config.item_name_column.as_str();
    let entity_column = config.entity_id_column.as_str();
    let item_column = config.item_id_column.as_str();

    table_mut(tables, relations_name)?
        .rows
        .retain(|row| cell(row, entity_column).as_i64() != Some(entity_id));

    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name.clone()) {
            continue;
        }

        let items = table_mut(tables, items_name)?;
        let existing = items
            .rows
            .iter()
            .find(|row| cell(row, name_column).as_str() == Some(name.as_str()))
            .cloned();
        let item = match existing {
            Some(row) => row,
            None => {
                let mut row = Row::new();
                row.insert(name_column.to_string(), Value::String(name.clone()));
                items
                    .insert_row(items_name, row, &OnConflict::Fail)?
                    .ok_or_else(|| failed(format!("could not create item {}", name)))?
            }
        };
        let item_id = cell(&item, pk).clone();

        let mut link = Row::new();
        link.insert(entity_column.to_string(), Value::from(entity_id));
        link.insert(item_column.to_string(), item_id);
        table_mut(tables, relations_name)?.insert_row(
            relations_name,
            link,
            &OnConflict::DoNothing(vec![
                config.entity_id_column.clone(),
                config.item_id_column.clone(),
            ]),
        )?;
    }

    Ok(())
}

fn table<'a>(tables: &'a Tables, name: &str) -> AtelierResult<&'a Table> {
    tables.get(name).ok_or_else(|| {
        StorageError::UnknownTable {
            table: name.to_string(),
        }
        .into()
    })
}

fn table_mut<'a>(tables: &'a mut Tables, name: &str) -> AtelierResult<&'a mut Table> {
    tables.get_mut(name).ok_or_else(|| {
        StorageError::UnknownTable {
            table: name.to_string(),
        }
        .into()
    })
}

fn column_names(columns: &[Identifier]) -> Vec<String> {
    columns.iter().map(|c| c.as_str().to_string()).collect()
}

fn cell<'a>(row: &'a Row, column: &str) -> &'a Value {
    row.get(column).unwrap_or(&Value::Null)
}

fn filter_matches(row: &Row, filter: &Filter) -> bool {
    let value = cell(row, filter.column.as_str());
    match filter.operator {
        FilterOperator::Eq => value == &filter.value,
        FilterOperator::In => filter.operands().contains(value),
        FilterOperator::InFolded => value
            .as_str()
            .map(|s| {
                let folded = s.to_lowercase();
                filter
                    .operands()
                    .iter()
                    .any(|operand| operand.as_str() == Some(folded.as_str()))
            })
            .unwrap_or(false),
    }
}

fn same_columns(target: &[Identifier], key: &[String]) -> bool {
    target.len() == key.len() && target.iter().all(|c| key.iter().any(|k| k == c.as_str()))
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! Backend-neutral query descriptions
//!
//! These are the requests a data-access handle must serve: filtered and
//! ordered selects (optionally embedding a joined row), inserts with a
//! conflict target, filtered deletes, and named procedure calls. Every name
//! is an [`Identifier`]; every operand is a JSON value.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Filter, Identifier};

/// A result row keyed by column name. Embedded rows appear as nested objects
/// under their alias.
pub type Row = serde_json::Map<String, Value>;

/// A joined lookup rendered as a nested object on each result row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    /// Table joined in
    pub table: Identifier,
    /// Key under which the joined row appears
    pub alias: Identifier,
    /// Column on the queried table
    pub local_column: Identifier,
    /// Column on the joined table matched against `local_column`
    pub foreign_column: Identifier,
    /// Columns of the joined table to include
    pub columns: Vec<Identifier>,
    /// Drop rows with no match (inner join) instead of embedding null
    pub inner: bool,
}

/// Sort order for a select.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: Identifier,
    pub ascending: bool,
}

/// A filtered, optionally ordered select.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    pub table: Identifier,
    pub columns: Vec<Identifier>,
    pub embed: Option<Embed>,
    pub filters: Vec<Filter>,
    pub order: Option<OrderBy>,
}

impl SelectQuery {
    /// Select from `table`; add columns with [`SelectQuery::column`].
    pub fn new(table: &Identifier) -> Self {
        Self {
            table: table.clone(),
            columns: Vec::new(),
            embed: None,
            filters: Vec::new(),
            order: None,
        }
    }

    pub fn column(mut self, column: &Identifier) -> Self {
        self.columns.push(column.clone());
        self
    }

    pub fn embed(mut self, embed: Embed) -> Self {
        self.embed = Some(embed);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, column: &Identifier, ascending: bool) -> Self {
        self.order = Some(OrderBy {
            column: column.clone(),
            ascending,
        });
        self
    }
}

/// What an insert does when a row collides with a unique constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnConflict {
    /// Surface the violation as an error.
    Fail,
    /// Skip colliding rows; the columns name the conflict target.
    DoNothing(Vec<Identifier>),
}

/// A multi-row insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertQuery {
    pub table: Identifier,
    pub columns: Vec<Identifier>,
    /// One inner vector per row, positionally matching `columns`
    pub rows: Vec<Vec<Value>>,
    pub on_conflict: OnConflict,
}

impl InsertQuery {
    pub fn into_table(table: &Identifier, columns: Vec<Identifier>) -> Self {
        Self {
            table: table.clone(),
            columns,
            rows: Vec::new(),
            on_conflict: OnConflict::Fail,
        }
    }

    pub fn row(mut self, values: Vec<Value>) -> Self {
        self.rows.push(values);
        self
    }

    pub fn on_conflict_do_nothing(mut self, target: Vec<Identifier>) -> Self {
        self.on_conflict = OnConflict::DoNothing(target);
        self
    }

    /// The inserted rows as column-keyed maps.
    pub fn keyed_rows(&self) -> Vec<Row> {
        self.rows
            .iter()
            .map(|values| {
                self.columns
                    .iter()
                    .zip(values)
                    .map(|(column, value)| (column.as_str().to_string(), value.clone()))
                    .collect()
            })
            .collect()
    }
}

/// A filtered delete. An empty filter list deletes nothing: backends refuse
/// unfiltered deletes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteQuery {
    pub table: Identifier,
    pub filters: Vec<Filter>,
}

impl DeleteQuery {
    pub fn new(table: &Identifier) -> Self {
        Self {
            table: table.clone(),
            filters: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }
}

/// Invocation of a server-side procedure with keyword arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureCall {
    pub name: Identifier,
    pub args: Vec<(Identifier, Value)>,
}

impl ProcedureCall {
    pub fn new(name: &Identifier) -> Self {
        Self {
            name: name.clone(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, name: &Identifier, value: impl Into<Value>) -> Self {
        self.args.push((name.clone(), value.into()));
        self
    }

    /// Look up an argument by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.args
            .iter()
            .find(|(arg, _)| arg.as_str() == name)
            .map(|(_, value)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ident(name: &str) -> Identifier {
        Identifier::new(name).unwrap()
    }

    #[test]
    fn test_select_builder() {
        let query = SelectQuery::new(&ident("post_tags"))
            .column(&ident("id"))
            .column(&ident("tag_name"))
            .filter(Filter::eq(&ident("id"), 1))
            .order_by(&ident("tag_name"), true);

        assert_eq!(query.table.as_str(), "post_tags");
        assert_eq!(query.columns.len(), 2);
        assert_eq!(query.filters.len(), 1);
        assert_eq!(
            query.order,
            Some(OrderBy {
                column: ident("tag_name"),
                ascending: true
            })
        );
        assert!(query.embed.is_none());
    }

    #[test]
    fn test_insert_keyed_rows() {
        let query = InsertQuery::into_table(
            &ident("posts_tags_rel"),
            vec![ident("post_id"), ident("tag_id")],
        )
        .row(vec![json!(42), json!(7)])
        .row(vec![json!(42), json!(8)])
        .on_conflict_do_nothing(vec![ident("post_id"), ident("tag_id")]);

        let rows = query.keyed_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("tag_id"), Some(&json!(8)));
        assert!(matches!(query.on_conflict, OnConflict::DoNothing(ref cols) if cols.len() == 2));
    }

    #[test]
    fn test_procedure_call_args() {
        let call = ProcedureCall::new(&ident("update_post_tags"))
            .arg(&ident("post_id_param"), 42)
            .arg(&ident("tag_names"), json!(["web", "cli"]));

        assert_eq!(call.get("post_id_param"), Some(&json!(42)));
        assert_eq!(call.get("tag_names"), Some(&json!(["web", "cli"])));
        assert_eq!(call.get("missing"), None);
    }
}

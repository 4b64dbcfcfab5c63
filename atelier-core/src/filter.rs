//! Filter expressions for data-access queries
//!
//! Filters name their column with a validated [`Identifier`] and carry their
//! operand as a JSON value, so every backend binds operands as parameters.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Identifier;

/// Filter operator for column comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Equal to
    Eq,
    /// In list of values
    In,
    /// In list of strings, compared after lowercasing both sides
    InFolded,
}

/// A single `column <op> operand` predicate. Filters in a query are ANDed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Column to filter on
    pub column: Identifier,
    /// Operator to apply
    pub operator: FilterOperator,
    /// Operand; an array for `In` and `InFolded`
    pub value: Value,
}

impl Filter {
    /// Create a new filter.
    pub fn new(column: Identifier, operator: FilterOperator, value: Value) -> Self {
        Self {
            column,
            operator,
            value,
        }
    }

    /// Create an equality filter.
    pub fn eq(column: &Identifier, value: impl Into<Value>) -> Self {
        Self::new(column.clone(), FilterOperator::Eq, value.into())
    }

    /// Create a membership filter.
    pub fn in_list<I, V>(column: &Identifier, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        Self::new(column.clone(), FilterOperator::In, Value::Array(values))
    }

    /// Create a case-insensitive membership filter over names.
    ///
    /// Operands are lowercased here; backends lowercase the column side.
    pub fn in_folded<I, S>(column: &Identifier, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values = names
            .into_iter()
            .map(|name| Value::String(name.as_ref().to_lowercase()))
            .collect();
        Self::new(column.clone(), FilterOperator::InFolded, Value::Array(values))
    }

    /// Operand values as a slice, treating a scalar as a one-element list.
    pub fn operands(&self) -> &[Value] {
        match &self.value {
            Value::Array(values) => values,
            scalar => std::slice::from_ref(scalar),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn col(name: &str) -> Identifier {
        Identifier::new(name).unwrap()
    }

    #[test]
    fn test_eq_filter() {
        let filter = Filter::eq(&col("post_id"), 42);
        assert_eq!(filter.operator, FilterOperator::Eq);
        assert_eq!(filter.value, json!(42));
        assert_eq!(filter.operands(), &[json!(42)]);
    }

    #[test]
    fn test_in_list_filter() {
        let filter = Filter::in_list(&col("tag_id"), [1, 2, 3]);
        assert_eq!(filter.operator, FilterOperator::In);
        assert_eq!(filter.operands().len(), 3);
    }

    #[test]
    fn test_in_folded_lowercases_operands() {
        let filter = Filter::in_folded(&col("tag_name"), ["Go", "RUST"]);
        assert_eq!(filter.operator, FilterOperator::InFolded);
        assert_eq!(filter.value, json!(["go", "rust"]));
    }
}

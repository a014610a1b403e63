//! Row selection for reads and bulk deletes.

use crate::row::Row;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Sort direction for [`Query::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// A conjunction of equality filters plus an optional ordering.
///
/// An empty query selects every row of a table in first-insertion order.
///
/// ```rust
/// use offsync_store::{Direction, Query};
///
/// let query = Query::all()
///     .filter("tablename", "todo")
///     .order_by("sequence", Direction::Ascending);
/// assert_eq!(query.filters().len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    filters: Vec<(String, Value)>,
    order: Vec<(String, Direction)>,
}

impl Query {
    /// Selects all rows.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts to rows whose column equals the value.
    ///
    /// A `Null` value matches rows where the column is absent or null.
    #[must_use]
    pub fn filter(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    /// Adds a sort key. Earlier keys take precedence; the sort is stable.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order.push((column.into(), direction));
        self
    }

    /// Returns the equality filters.
    #[must_use]
    pub fn filters(&self) -> &[(String, Value)] {
        &self.filters
    }

    /// Returns true if the row satisfies every filter.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|(column, expected)| match row.get(column) {
            Some(actual) => actual == expected,
            None => expected.is_null(),
        })
    }

    /// Sorts rows in place by the query's ordering.
    pub fn sort(&self, rows: &mut [Row]) {
        if self.order.is_empty() {
            return;
        }

        rows.sort_by(|a, b| {
            for (column, direction) in &self.order {
                let left = a.get(column).unwrap_or(&Value::Null);
                let right = b.get(column).unwrap_or(&Value::Null);
                let ord = match direction {
                    Direction::Ascending => left.sort_cmp(right),
                    Direction::Descending => right.sort_cmp(left),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }
}

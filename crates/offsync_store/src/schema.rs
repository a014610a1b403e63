//! Table schemas.

use crate::error::{StoreError, StoreResult};
use crate::row::{Row, ID_COLUMN};
use crate::value::ColumnType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The fixed column set of a named table.
///
/// Every schema has an `id` column of type [`ColumnType::String`]; it is added
/// by [`TableSchema::new`]. Columns added with
/// [`TableSchema::required_column`] must hold a non-null value in every row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    columns: BTreeMap<String, ColumnType>,
    #[serde(default)]
    required: BTreeSet<String>,
}

impl TableSchema {
    /// Creates a schema with only the `id` column.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let mut columns = BTreeMap::new();
        columns.insert(ID_COLUMN.to_string(), ColumnType::String);
        Self {
            name: name.into(),
            columns,
            required: BTreeSet::new(),
        }
    }

    /// Adds a column and returns the schema.
    ///
    /// The `id` column cannot be retyped.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        let name = name.into();
        if name != ID_COLUMN {
            self.required.remove(&name);
            self.columns.insert(name, ty);
        }
        self
    }

    /// Adds a column that may not be missing or null.
    #[must_use]
    pub fn required_column(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        let name = name.into();
        if name != ID_COLUMN {
            self.columns.insert(name.clone(), ty);
            self.required.insert(name);
        }
        self
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared type of a column.
    #[must_use]
    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.columns.get(column).copied()
    }

    /// Returns true if the column must hold a non-null value.
    #[must_use]
    pub fn is_required(&self, column: &str) -> bool {
        column == ID_COLUMN || self.required.contains(column)
    }

    /// Iterates over `(column, type)` pairs.
    pub fn columns(&self) -> impl Iterator<Item = (&str, ColumnType)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Checks that a row fits this schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the row has no text id, lacks a required column,
    /// carries an undeclared column, or a value the column type does not
    /// accept.
    pub fn validate(&self, row: &Row) -> StoreResult<()> {
        if row.id().is_none() {
            return Err(StoreError::MissingId {
                table: self.name.clone(),
            });
        }

        if let Some(column) = self.required.iter().find(|column| row.is_null(column)) {
            return Err(StoreError::MissingColumn {
                table: self.name.clone(),
                column: column.clone(),
            });
        }

        for (column, value) in row.iter() {
            let Some(ty) = self.column_type(column) else {
                return Err(StoreError::UnknownColumn {
                    table: self.name.clone(),
                    column: column.to_string(),
                });
            };
            if !ty.accepts(value) {
                return Err(StoreError::TypeMismatch {
                    table: self.name.clone(),
                    column: column.to_string(),
                    expected: ty,
                });
            }
        }

        Ok(())
    }
}

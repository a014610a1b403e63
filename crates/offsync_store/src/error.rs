//! Error types for store operations.

use std::io;
use thiserror::Error;

use crate::value::ColumnType;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The persisted log is corrupted.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// A log record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The table has not been defined.
    #[error("unknown table: {table}")]
    UnknownTable {
        /// Name of the table.
        table: String,
    },

    /// The row has no textual `id` column.
    #[error("row for table {table} has no text id")]
    MissingId {
        /// Name of the table.
        table: String,
    },

    /// A required column is missing or null.
    #[error("column {column} in table {table} is required")]
    MissingColumn {
        /// Name of the table.
        table: String,
        /// Name of the column.
        column: String,
    },

    /// The row carries a column the table does not declare.
    #[error("unknown column {column} in table {table}")]
    UnknownColumn {
        /// Name of the table.
        table: String,
        /// Name of the column.
        column: String,
    },

    /// A value does not fit the declared column type.
    #[error("column {column} in table {table} expects {expected:?}")]
    TypeMismatch {
        /// Name of the table.
        table: String,
        /// Name of the column.
        column: String,
        /// Declared type of the column.
        expected: ColumnType,
    },
}

impl StoreError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec(message.into())
    }

    /// Creates an unknown table error.
    pub fn unknown_table(table: impl Into<String>) -> Self {
        Self::UnknownTable {
            table: table.into(),
        }
    }
}

//! Durable store trait definition.

use crate::error::StoreResult;
use crate::query::Query;
use crate::row::Row;
use crate::schema::TableSchema;

/// A table-oriented durable store.
///
/// Stores hold named tables with a fixed column schema and rows keyed by
/// their text `id` column. They know nothing about pending operations or
/// error records; the queue and error list own their row formats.
///
/// # Invariants
///
/// - `upsert` replaces an existing row with the same id, keeping its position
/// - a successful mutation is durable when the call returns
/// - a failed mutation leaves the table unchanged
/// - stores are `Send + Sync` and lock internally
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing and ephemeral state
/// - [`super::FileStore`] - Append-only log file
pub trait Store: Send + Sync {
    /// Declares a table and its columns.
    ///
    /// Defining an existing table with the same schema is a no-op; a
    /// different schema replaces the column set.
    ///
    /// # Errors
    ///
    /// Returns an error if the definition cannot be persisted.
    fn define_table(&self, schema: TableSchema) -> StoreResult<()>;

    /// Inserts or replaces a row by its `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The table is not defined
    /// - The row does not fit the schema
    /// - An I/O error occurs
    fn upsert(&self, table: &str, row: Row) -> StoreResult<()>;

    /// Deletes a row by id. Deleting a missing row is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is not defined or an I/O error occurs.
    fn delete(&self, table: &str, id: &str) -> StoreResult<()>;

    /// Deletes all rows matching a query.
    ///
    /// Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is not defined or an I/O error occurs.
    fn delete_matching(&self, table: &str, query: &Query) -> StoreResult<usize>;

    /// Reads all rows matching a query.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is not defined or an I/O error occurs.
    fn read(&self, table: &str, query: &Query) -> StoreResult<Vec<Row>>;
}

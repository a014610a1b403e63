//! In-memory store for testing.

use crate::error::StoreResult;
use crate::query::Query;
use crate::row::Row;
use crate::schema::TableSchema;
use crate::store::Store;
use crate::table::Tables;
use parking_lot::RwLock;

/// An in-memory store.
///
/// This store keeps all tables in memory and is suitable for:
/// - Unit tests
/// - Simulating a restart by loading a second queue from the same store
/// - Ephemeral queues that don't need persistence
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use offsync_store::{ColumnType, InMemoryStore, Query, Row, Store, TableSchema};
///
/// let store = InMemoryStore::new();
/// store.define_table(TableSchema::new("notes").column("text", ColumnType::String)).unwrap();
/// store.upsert("notes", Row::new().with("id", "n1").with("text", "hello")).unwrap();
/// assert_eq!(store.read("notes", &Query::all()).unwrap().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of rows in a table, or zero if it is not defined.
    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .read(table, &Query::all())
            .map_or(0, |rows| rows.len())
    }
}

impl Store for InMemoryStore {
    fn define_table(&self, schema: TableSchema) -> StoreResult<()> {
        self.tables.write().define(schema);
        Ok(())
    }

    fn upsert(&self, table: &str, row: Row) -> StoreResult<()> {
        self.tables.write().upsert(table, row)
    }

    fn delete(&self, table: &str, id: &str) -> StoreResult<()> {
        self.tables.write().delete(table, id).map(|_| ())
    }

    fn delete_matching(&self, table: &str, query: &Query) -> StoreResult<usize> {
        let mut tables = self.tables.write();
        let ids = tables.matching_ids(table, query)?;
        for id in &ids {
            tables.delete(table, id)?;
        }
        Ok(ids.len())
    }

    fn read(&self, table: &str, query: &Query) -> StoreResult<Vec<Row>> {
        self.tables.read().read(table, query)
    }
}

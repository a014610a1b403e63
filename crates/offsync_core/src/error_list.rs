//! Durable list of operation errors.

use offsync_store::{Direction, Query, Store};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::CoreResult;
use crate::rows;
use crate::table_error::TableOperationError;

/// Errors recorded while pushing operations, kept until cleared.
///
/// Every mutation writes the store first and updates memory only if the
/// write succeeded.
pub struct OperationErrorList {
    store: Arc<dyn Store>,
    table: String,
    errors: RwLock<Vec<TableOperationError>>,
}

impl OperationErrorList {
    /// Loads the error list, defining its table if needed.
    ///
    /// Errors are ordered by creation time; equal times keep stored order.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the table cannot be defined or read, and a
    /// deserialization error if any row cannot be decoded.
    pub fn load(store: Arc<dyn Store>, config: &Config) -> CoreResult<Self> {
        let table = config.error_table.clone();
        store.define_table(rows::error_schema(&table))?;

        let stored = store.read(
            &table,
            &Query::all().order_by(rows::CREATED_AT, Direction::Ascending),
        )?;
        let mut errors = stored
            .iter()
            .map(|row| rows::decode_error(&table, row))
            .collect::<CoreResult<Vec<_>>>()?;
        errors.sort_by_key(TableOperationError::created_at);

        info!(table = %table, count = errors.len(), "loaded operation errors");
        Ok(Self {
            store,
            table,
            errors: RwLock::new(errors),
        })
    }

    /// Records an error.
    ///
    /// Adding an error whose id is already recorded replaces that record.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the row cannot be written.
    pub fn add(&self, error: TableOperationError) -> CoreResult<()> {
        let mut errors = self.errors.write();
        self.store.upsert(&self.table, rows::encode_error(&error))?;
        debug!(
            table = error.table_name(),
            item_id = error.item_id(),
            status = ?error.status_code(),
            "recorded operation error"
        );
        match errors.iter().position(|known| known.id() == error.id()) {
            Some(index) => {
                errors[index] = error;
                errors.sort_by_key(TableOperationError::created_at);
            }
            None => errors.push(error),
        }
        Ok(())
    }

    /// Returns the number of recorded errors.
    #[must_use]
    pub fn count_pending(&self) -> usize {
        self.errors.read().len()
    }

    /// Returns a snapshot of all recorded errors, oldest first.
    #[must_use]
    pub fn get_all(&self) -> Vec<TableOperationError> {
        self.errors.read().clone()
    }

    /// Removes every recorded error.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the rows cannot be deleted.
    pub fn clear(&self) -> CoreResult<()> {
        let mut errors = self.errors.write();
        let removed = self.store.delete_matching(&self.table, &Query::all())?;
        errors.clear();
        info!(table = %self.table, removed, "cleared operation errors");
        Ok(())
    }
}

impl std::fmt::Debug for OperationErrorList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationErrorList")
            .field("table", &self.table)
            .field("count", &self.count_pending())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::PendingOperation;
    use offsync_store::InMemoryStore;
    use serde_json::json;

    fn store() -> Arc<dyn Store> {
        Arc::new(InMemoryStore::new())
    }

    #[test]
    fn empty_store_loads_empty_list() {
        let list = OperationErrorList::load(store(), &Config::default()).unwrap();
        assert_eq!(list.count_pending(), 0);
        assert!(list.get_all().is_empty());
    }

    #[test]
    fn add_then_reload_reproduces_records() {
        let store = store();
        let op = PendingOperation::update("todo", "1", json!({"v": 1}));
        let full = TableOperationError::from_operation(&op, "conflict")
            .with_status_code(409)
            .with_server_response("{\"v\":0}")
            .with_server_item(json!({"v": 0}));
        let bare = TableOperationError::from_operation(&PendingOperation::delete("todo", "2"), "gone");

        {
            let list = OperationErrorList::load(Arc::clone(&store), &Config::default()).unwrap();
            list.add(full.clone()).unwrap();
            list.add(bare.clone()).unwrap();
            assert_eq!(list.count_pending(), 2);
        }

        let list = OperationErrorList::load(store, &Config::default()).unwrap();
        assert_eq!(list.get_all(), vec![full, bare]);
    }

    #[test]
    fn clear_removes_rows() {
        let store = store();
        let list = OperationErrorList::load(Arc::clone(&store), &Config::default()).unwrap();
        let op = PendingOperation::delete("todo", "1");
        list.add(TableOperationError::from_operation(&op, "a")).unwrap();
        list.add(TableOperationError::from_operation(&op, "b")).unwrap();

        list.clear().unwrap();
        assert_eq!(list.count_pending(), 0);

        let list = OperationErrorList::load(store, &Config::default()).unwrap();
        assert_eq!(list.count_pending(), 0);
    }

    #[test]
    fn custom_table_name() {
        let store = store();
        let config = Config::new().error_table("sync_errors");
        let list = OperationErrorList::load(Arc::clone(&store), &config).unwrap();
        let op = PendingOperation::delete("todo", "1");
        list.add(TableOperationError::from_operation(&op, "a")).unwrap();
        assert_eq!(store.read("sync_errors", &Query::all()).unwrap().len(), 1);
    }

    #[test]
    fn re_adding_an_id_replaces_the_record() {
        let store = store();
        let list = OperationErrorList::load(Arc::clone(&store), &Config::default()).unwrap();
        let op = PendingOperation::delete("todo", "1");
        let first = TableOperationError::from_operation(&op, "first");
        list.add(first.clone()).unwrap();
        list.add(TableOperationError::from_operation(&op, "other")).unwrap();
        list.add(first.clone().with_status_code(409)).unwrap();

        assert_eq!(list.count_pending(), 2);
        let recorded = list.get_all();
        assert_eq!(recorded[0].id(), first.id());
        assert_eq!(recorded[0].status_code(), Some(409));

        let reloaded = OperationErrorList::load(store, &Config::default()).unwrap();
        assert_eq!(reloaded.count_pending(), list.count_pending());
        assert_eq!(reloaded.get_all(), recorded);
    }

    #[test]
    fn undecodable_row_fails_load() {
        let store = store();
        store.define_table(rows::error_schema("__errors")).unwrap();
        store
            .upsert(
                "__errors",
                offsync_store::Row::new()
                    .with("id", "e1")
                    .with(rows::TABLE_NAME, "todo")
                    .with(rows::ITEM_ID, "1")
                    .with(rows::ERROR_MESSAGE, "x")
                    .with(rows::CREATED_AT, "last tuesday")
                    .with(rows::OPERATION_KIND, 0_i64),
            )
            .unwrap();

        let err = OperationErrorList::load(store, &Config::default()).unwrap_err();
        assert!(matches!(err, crate::CoreError::Deserialization { .. }));
    }
}

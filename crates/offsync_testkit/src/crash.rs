//! Storage failure injection.
//!
//! This module provides a store wrapper that fails chosen writes, for
//! testing that the queue and error list leave memory untouched when the
//! store refuses a mutation.
//!
//! ## Test Strategy
//!
//! 1. **Failed first write** - Nothing is queued
//! 2. **Failed collapse write** - The queued operation is unchanged
//! 3. **Failed replace, then crash** - Reload keeps exactly one operation
//! 4. **Failed dequeue** - The operation stays at the head
//!
//! ## Usage
//!
//! ```rust,ignore
//! use offsync_testkit::crash::CrashableStore;
//!
//! let store = Arc::new(CrashableStore::new(Arc::new(InMemoryStore::new())));
//! store.fail_next_upserts(1);
//! assert!(queue.enqueue(op).is_err());
//! ```

use offsync_store::{Query, Row, Store, StoreError, StoreResult, TableSchema};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;

const UNLIMITED: usize = usize::MAX;

/// When a kind of write starts and stops failing.
#[derive(Debug, Clone, Copy)]
struct Fault {
    /// Calls that still succeed before failures start.
    skip: usize,
    /// Calls that fail once started.
    fail: usize,
}

impl Fault {
    const NONE: Self = Self { skip: 0, fail: 0 };

    /// Consumes one call; returns true if it must fail.
    fn hit(&mut self) -> bool {
        if self.fail == 0 {
            return false;
        }
        if self.skip > 0 {
            self.skip -= 1;
            return false;
        }
        if self.fail != UNLIMITED {
            self.fail -= 1;
        }
        true
    }
}

/// A store wrapper that can simulate write failures.
///
/// Upserts and deletes are armed separately. `delete_matching` counts as a
/// delete. Reads and table definitions always pass through.
pub struct CrashableStore {
    inner: Arc<dyn Store>,
    upserts: Mutex<Fault>,
    deletes: Mutex<Fault>,
    failures: Mutex<usize>,
}

impl CrashableStore {
    /// Creates a new crashable store wrapping an inner store.
    pub fn new(inner: Arc<dyn Store>) -> Self {
        Self {
            inner,
            upserts: Mutex::new(Fault::NONE),
            deletes: Mutex::new(Fault::NONE),
            failures: Mutex::new(0),
        }
    }

    /// Lets `count` more upserts succeed, then fails every later one.
    pub fn fail_upserts_after(&self, count: usize) {
        *self.upserts.lock() = Fault {
            skip: count,
            fail: UNLIMITED,
        };
    }

    /// Lets `count` more deletes succeed, then fails every later one.
    pub fn fail_deletes_after(&self, count: usize) {
        *self.deletes.lock() = Fault {
            skip: count,
            fail: UNLIMITED,
        };
    }

    /// Fails the next `count` upserts, then succeeds again.
    pub fn fail_next_upserts(&self, count: usize) {
        *self.upserts.lock() = Fault {
            skip: 0,
            fail: count,
        };
    }

    /// Fails the next `count` deletes, then succeeds again.
    pub fn fail_next_deletes(&self, count: usize) {
        *self.deletes.lock() = Fault {
            skip: 0,
            fail: count,
        };
    }

    /// Makes every write succeed again.
    pub fn reset(&self) {
        *self.upserts.lock() = Fault::NONE;
        *self.deletes.lock() = Fault::NONE;
    }

    /// Returns the number of simulated failures so far.
    pub fn failures(&self) -> usize {
        *self.failures.lock()
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &Arc<dyn Store> {
        &self.inner
    }

    fn check(&self, fault: &Mutex<Fault>, what: &str) -> StoreResult<()> {
        if fault.lock().hit() {
            *self.failures.lock() += 1;
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("simulated {what} failure"),
            )));
        }
        Ok(())
    }
}

impl Store for CrashableStore {
    fn define_table(&self, schema: TableSchema) -> StoreResult<()> {
        self.inner.define_table(schema)
    }

    fn upsert(&self, table: &str, row: Row) -> StoreResult<()> {
        self.check(&self.upserts, "upsert")?;
        self.inner.upsert(table, row)
    }

    fn delete(&self, table: &str, id: &str) -> StoreResult<()> {
        self.check(&self.deletes, "delete")?;
        self.inner.delete(table, id)
    }

    fn delete_matching(&self, table: &str, query: &Query) -> StoreResult<usize> {
        self.check(&self.deletes, "delete")?;
        self.inner.delete_matching(table, query)
    }

    fn read(&self, table: &str, query: &Query) -> StoreResult<Vec<Row>> {
        self.inner.read(table, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{delete_op, insert_op, update_op, TestQueue};
    use offsync_core::{OperationKind, TableOperationError};
    use offsync_store::InMemoryStore;

    fn setup() -> (Arc<CrashableStore>, TestQueue) {
        let store = Arc::new(CrashableStore::new(Arc::new(InMemoryStore::new())));
        let fixture = TestQueue::over(Arc::clone(&store) as Arc<dyn Store>);
        (store, fixture)
    }

    fn stored_ops(store: &CrashableStore) -> usize {
        store.read("__operations", &Query::all()).unwrap().len()
    }

    #[test]
    fn faults_arm_and_disarm() {
        let store = CrashableStore::new(Arc::new(InMemoryStore::new()));
        store.define_table(TableSchema::new("t")).unwrap();
        store.fail_upserts_after(1);
        assert!(store.upsert("t", Row::new().with("id", "a")).is_ok());
        assert!(store.upsert("t", Row::new().with("id", "b")).is_err());
        assert!(store.upsert("t", Row::new().with("id", "c")).is_err());
        assert_eq!(store.failures(), 2);

        store.reset();
        assert!(store.upsert("t", Row::new().with("id", "d")).is_ok());

        store.fail_next_upserts(1);
        assert!(store.upsert("t", Row::new().with("id", "e")).is_err());
        assert!(store.upsert("t", Row::new().with("id", "f")).is_ok());
        assert_eq!(store.failures(), 3);
    }

    #[test]
    fn failed_append_queues_nothing() {
        let (store, fixture) = setup();
        store.fail_upserts_after(0);

        let err = fixture.queue.enqueue(insert_op("todo", "a")).unwrap_err();
        assert!(err.is_storage());
        assert_eq!(fixture.queue.count_pending(), 0);
        assert_eq!(fixture.queue.count_pending_for("todo"), 0);
        assert!(fixture.queue.pending_operation("todo", "a").is_none());
        assert_eq!(stored_ops(&store), 0);
    }

    #[test]
    fn failed_cancel_keeps_entry() {
        let (store, fixture) = setup();
        fixture.queue.enqueue(insert_op("todo", "a")).unwrap();
        store.fail_deletes_after(0);

        assert!(fixture.queue.enqueue(delete_op("todo", "a")).is_err());
        assert_eq!(fixture.queue.count_pending(), 1);
        assert_eq!(
            fixture.queue.peek().unwrap().kind(),
            OperationKind::Insert
        );
        assert_eq!(stored_ops(&store), 1);
    }

    #[test]
    fn failed_merge_keeps_payload() {
        let (store, fixture) = setup();
        let original = insert_op("todo", "a");
        fixture.queue.enqueue(original.clone()).unwrap();
        store.fail_upserts_after(0);

        assert!(fixture.queue.enqueue(update_op("todo", "a", 7)).is_err());
        assert_eq!(fixture.queue.peek().unwrap(), original);

        store.reset();
        let fixture = fixture.reload();
        assert_eq!(fixture.queue.peek().unwrap(), original);
    }

    #[test]
    fn failed_replace_write_keeps_old_operation() {
        let (store, fixture) = setup();
        fixture.queue.enqueue(update_op("todo", "a", 1)).unwrap();
        store.fail_upserts_after(0);

        assert!(fixture.queue.enqueue(delete_op("todo", "a")).is_err());
        assert_eq!(fixture.queue.peek().unwrap().kind(), OperationKind::Update);
        assert_eq!(stored_ops(&store), 1);
    }

    #[test]
    fn failed_replace_delete_rolls_back() {
        let (store, fixture) = setup();
        let original = update_op("todo", "a", 1);
        fixture.queue.enqueue(original.clone()).unwrap();
        fixture.queue.enqueue(insert_op("todo", "b")).unwrap();
        // The old-row delete fails; the rollback delete goes through.
        store.fail_next_deletes(1);

        assert!(fixture.queue.enqueue(delete_op("todo", "a")).is_err());
        assert_eq!(store.failures(), 1);
        assert_eq!(stored_ops(&store), 2);
        assert_eq!(fixture.queue.count_pending(), 2);
        assert_eq!(fixture.queue.peek().unwrap(), original);

        let fixture = fixture.reload();
        assert_eq!(fixture.queue.peek().unwrap(), original);
        assert_eq!(fixture.drain_item_ids(), vec!["a", "b"]);
    }

    #[test]
    fn replace_interrupted_before_rollback_reloads_newest() {
        let (store, fixture) = setup();
        let original = update_op("todo", "a", 1);
        fixture.queue.enqueue(original.clone()).unwrap();
        store.fail_deletes_after(0);

        // Both the old-row delete and the rollback fail, as in a crash.
        let replacement = delete_op("todo", "a");
        assert!(fixture.queue.enqueue(replacement.clone()).is_err());
        assert_eq!(fixture.queue.peek().unwrap(), original);
        assert_eq!(stored_ops(&store), 2);

        store.reset();
        let fixture = fixture.reload();
        assert_eq!(fixture.queue.count_pending(), 1);
        assert_eq!(fixture.queue.peek().unwrap(), replacement);
        assert_eq!(stored_ops(&store), 1);
    }

    #[test]
    fn failed_dequeue_keeps_head() {
        let (store, fixture) = setup();
        fixture.queue.enqueue(insert_op("todo", "a")).unwrap();
        fixture.queue.enqueue(insert_op("todo", "b")).unwrap();
        store.fail_deletes_after(0);

        let bookmark = fixture.queue.bookmark();
        assert!(bookmark.dequeue().unwrap_err().is_storage());
        assert!(fixture.queue.dequeue().unwrap_err().is_storage());
        assert_eq!(fixture.queue.count_pending(), 2);
        drop(bookmark);

        store.reset();
        assert_eq!(fixture.drain_item_ids(), vec!["a", "b"]);
    }

    #[test]
    fn failed_error_add_records_nothing() {
        let (store, fixture) = setup();
        store.fail_upserts_after(0);
        let error = TableOperationError::from_operation(&delete_op("todo", "a"), "gone");

        assert!(fixture.errors.add(error).is_err());
        assert_eq!(fixture.errors.count_pending(), 0);
    }

    #[test]
    fn failed_error_clear_keeps_records() {
        let (store, fixture) = setup();
        let error = TableOperationError::from_operation(&delete_op("todo", "a"), "gone");
        fixture.errors.add(error).unwrap();
        store.fail_deletes_after(0);

        assert!(fixture.errors.clear().is_err());
        assert_eq!(fixture.errors.count_pending(), 1);
    }
}

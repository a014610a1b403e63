//! Cross-crate integration test helpers.
//!
//! Provides a scripted remote backend for push tests and the end-to-end
//! scenarios that exercise queue, error list and stores together.

use offsync_core::{ApplyError, PendingOperation, RemoteApplier, RemoteRejection};
use std::collections::{HashMap, HashSet};

/// A fake remote backend driven by a script.
///
/// Applied operations are recorded in order. Specific rows can be made to
/// reject, and the backend can go offline after a number of calls.
#[derive(Debug, Default)]
pub struct ScriptedRemote {
    applied: Vec<PendingOperation>,
    rejections: HashMap<(String, String), RemoteRejection>,
    offline: HashSet<(String, String)>,
    calls_before_offline: Option<usize>,
    calls: usize,
}

impl ScriptedRemote {
    /// Creates a backend that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects every operation on a row.
    #[must_use]
    pub fn reject(mut self, table: &str, item_id: &str, rejection: RemoteRejection) -> Self {
        self.rejections
            .insert((table.to_string(), item_id.to_string()), rejection);
        self
    }

    /// Reports the backend unavailable when this row is sent.
    #[must_use]
    pub fn offline_at(mut self, table: &str, item_id: &str) -> Self {
        self.offline
            .insert((table.to_string(), item_id.to_string()));
        self
    }

    /// Goes offline after accepting this many calls.
    #[must_use]
    pub fn offline_after(mut self, calls: usize) -> Self {
        self.calls_before_offline = Some(calls);
        self
    }

    /// Brings the backend back online.
    pub fn reconnect(&mut self) {
        self.offline.clear();
        self.calls_before_offline = None;
    }

    /// Returns the operations applied so far.
    pub fn applied(&self) -> &[PendingOperation] {
        &self.applied
    }

    /// Returns the applied item ids in order.
    pub fn applied_item_ids(&self) -> Vec<String> {
        self.applied
            .iter()
            .map(|op| op.item_id().to_string())
            .collect()
    }
}

impl RemoteApplier for ScriptedRemote {
    fn apply(&mut self, op: &PendingOperation) -> Result<(), ApplyError> {
        let key = (op.table_name().to_string(), op.item_id().to_string());
        if self.offline.contains(&key)
            || self
                .calls_before_offline
                .is_some_and(|limit| self.calls >= limit)
        {
            return Err(ApplyError::Unavailable("backend unreachable".to_string()));
        }
        self.calls += 1;
        if let Some(rejection) = self.rejections.get(&key) {
            return Err(ApplyError::Rejected(rejection.clone()));
        }
        self.applied.push(op.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{delete_op, insert_op, update_op, TestQueue};
    use offsync_core::{push_pending, OperationKind, TableOperationError};
    use offsync_store::{FileStore, Query, Store};
    use serde_json::json;
    use std::fs::OpenOptions;
    use std::io::Write;

    fn both() -> [TestQueue; 2] {
        [TestQueue::memory(), TestQueue::file()]
    }

    #[test]
    fn bookmark_snapshot_excludes_later_operations() {
        for fixture in both() {
            fixture.queue.enqueue(insert_op("T", "A")).unwrap();
            fixture.queue.enqueue(insert_op("T", "B")).unwrap();
            let bookmark = fixture.queue.bookmark();
            fixture.queue.enqueue(insert_op("T", "C")).unwrap();

            let mut seen = Vec::new();
            while let Some(op) = bookmark.dequeue().unwrap() {
                seen.push(op.item_id().to_string());
            }
            assert_eq!(seen, vec!["A", "B"]);
            drop(bookmark);

            assert_eq!(fixture.queue.dequeue().unwrap().unwrap().item_id(), "C");
        }
    }

    #[test]
    fn younger_bookmark_cannot_dequeue() {
        let fixture = TestQueue::memory();
        fixture.queue.enqueue(insert_op("T", "A")).unwrap();
        let b1 = fixture.queue.bookmark();
        let b2 = fixture.queue.bookmark();

        assert!(b2.dequeue().unwrap_err().is_invalid_state());
        assert_eq!(fixture.queue.count_pending(), 1);
        drop(b1);
        assert!(b2.dequeue().unwrap().is_some());
    }

    #[test]
    fn insert_update_delete_cancels_out() {
        for fixture in both() {
            fixture.queue.enqueue(insert_op("T", "x")).unwrap();
            fixture.queue.enqueue(update_op("T", "x", 1)).unwrap();
            fixture.queue.enqueue(delete_op("T", "x")).unwrap();
            assert_eq!(fixture.queue.count_pending(), 0);

            let fixture = fixture.reload();
            assert_eq!(fixture.queue.count_pending(), 0);
            assert!(fixture.queue.dequeue().unwrap().is_none());
        }
    }

    #[test]
    fn empty_queue_bookmark_then_unbookmark() {
        let fixture = TestQueue::memory();
        let bookmark = fixture.queue.bookmark();
        assert!(bookmark.dequeue().unwrap().is_none());
        assert!(bookmark.is_current_bookmark());

        fixture.queue.unbookmark(&bookmark);
        assert!(bookmark.is_cancelled());
        assert!(bookmark.dequeue().unwrap_err().is_invalid_state());
    }

    #[test]
    fn error_list_round_trips_through_file_store() {
        let fixture = TestQueue::file();
        let op = update_op("todo", "1", 4);
        let full = TableOperationError::from_operation(&op, "conflict")
            .with_status_code(409)
            .with_server_response("{\"version\":5}")
            .with_server_item(json!({"id": "1", "version": 5}));
        let bare = TableOperationError::from_operation(&delete_op("todo", "2"), "not found");
        fixture.errors.add(full.clone()).unwrap();
        fixture.errors.add(bare.clone()).unwrap();

        let fixture = fixture.reload();
        assert_eq!(fixture.errors.get_all(), vec![full, bare]);

        fixture.errors.clear().unwrap();
        let fixture = fixture.reload();
        assert_eq!(fixture.errors.count_pending(), 0);
    }

    #[test]
    fn reload_preserves_order_and_collapsed_payloads() {
        let fixture = TestQueue::file();
        fixture.queue.enqueue(insert_op("todo", "a")).unwrap();
        fixture.queue.enqueue(update_op("notes", "n", 1)).unwrap();
        fixture.queue.enqueue(update_op("todo", "a", 2)).unwrap();
        fixture.queue.enqueue(delete_op("notes", "n")).unwrap();
        fixture.queue.enqueue(insert_op("todo", "b")).unwrap();

        let fixture = fixture.reload();
        assert_eq!(fixture.queue.count_pending_for("todo"), 2);
        assert_eq!(fixture.queue.count_pending_for("notes"), 1);

        let a = fixture.queue.dequeue().unwrap().unwrap();
        assert_eq!(a.item_id(), "a");
        assert_eq!(a.kind(), OperationKind::Insert);
        assert_eq!(a.item(), Some(&json!({"id": "a", "version": 2})));
        // The replaced delete for "n" was queued before "b".
        assert_eq!(fixture.drain_item_ids(), vec!["n", "b"]);
    }

    #[test]
    fn sequences_keep_growing_across_restarts() {
        let fixture = TestQueue::file();
        fixture.queue.enqueue(insert_op("todo", "a")).unwrap();
        fixture.queue.enqueue(insert_op("todo", "b")).unwrap();
        fixture.queue.dequeue().unwrap();

        let fixture = fixture.reload();
        fixture.queue.enqueue(insert_op("todo", "c")).unwrap();
        let fixture = fixture.reload();
        fixture.queue.enqueue(insert_op("todo", "d")).unwrap();

        assert_eq!(fixture.drain_item_ids(), vec!["b", "c", "d"]);
    }

    #[test]
    fn torn_tail_loses_only_the_last_write() {
        let fixture = TestQueue::file();
        fixture.queue.enqueue(insert_op("todo", "a")).unwrap();
        fixture.queue.enqueue(insert_op("todo", "b")).unwrap();
        let path = fixture.log_path().unwrap().to_path_buf();

        // Simulate a crash that wrote half a frame.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&offsync_store::FRAME_MAGIC).unwrap();
            file.write_all(&[0x40, 0x00]).unwrap();
        }

        let fixture = fixture.reload();
        assert_eq!(fixture.queue.count_pending(), 2);
        fixture.queue.enqueue(insert_op("todo", "c")).unwrap();

        let fixture = fixture.reload();
        assert_eq!(fixture.drain_item_ids(), vec!["a", "b", "c"]);
    }

    #[test]
    fn compaction_keeps_queue_contents() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("queue.log");
        let config = offsync_core::Config::default();
        {
            let store = std::sync::Arc::new(FileStore::open(&path).unwrap());
            let queue = offsync_core::OperationQueue::load(store.clone(), &config).unwrap();
            for i in 0..50 {
                queue.enqueue(update_op("todo", &format!("r{}", i % 5), i)).unwrap();
            }
            let before = store.log_size();
            store.compact().unwrap();
            assert!(store.log_size() < before);
            assert_eq!(queue.count_pending(), 5);
        }

        let store = std::sync::Arc::new(FileStore::open(&path).unwrap());
        let queue = offsync_core::OperationQueue::load(store, &config).unwrap();
        let last = queue.pending_operation("todo", "r4").unwrap();
        assert_eq!(last.item(), Some(&json!({"id": "r4", "version": 49})));
        assert_eq!(queue.count_pending(), 5);
    }

    #[test]
    fn push_records_rejections_and_continues() {
        let fixture = TestQueue::file();
        for id in ["1", "2", "3"] {
            fixture.queue.enqueue(insert_op("todo", id)).unwrap();
        }
        let mut remote = ScriptedRemote::new().reject(
            "todo",
            "2",
            RemoteRejection::new("duplicate key").with_status_code(409),
        );

        let summary = push_pending(&fixture.queue, &fixture.errors, &mut remote).unwrap();
        assert_eq!(summary.pushed, 2);
        assert_eq!(summary.rejected, 1);
        assert_eq!(remote.applied_item_ids(), vec!["1", "3"]);

        let fixture = fixture.reload();
        assert_eq!(fixture.queue.count_pending(), 0);
        let errors = fixture.errors.get_all();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].item_id(), "2");
        assert_eq!(errors[0].status_code(), Some(409));
        assert_eq!(errors[0].client_item(), Some(&json!({"id": "2", "version": 0})));
    }

    #[test]
    fn interrupted_push_resumes_after_restart() {
        let fixture = TestQueue::file();
        for id in ["1", "2", "3", "4"] {
            fixture.queue.enqueue(insert_op("todo", id)).unwrap();
        }

        let mut remote = ScriptedRemote::new().offline_after(2);
        let summary = push_pending(&fixture.queue, &fixture.errors, &mut remote).unwrap();
        assert_eq!(summary.pushed, 2);
        assert!(!summary.is_complete());

        // Local edits made while offline collapse into the waiting operations.
        fixture.queue.enqueue(update_op("todo", "3", 8)).unwrap();
        fixture.queue.enqueue(insert_op("todo", "5")).unwrap();

        let fixture = fixture.reload();
        remote.reconnect();
        let summary = push_pending(&fixture.queue, &fixture.errors, &mut remote).unwrap();
        assert!(summary.is_complete());
        assert_eq!(summary.pushed, 3);
        assert_eq!(remote.applied_item_ids(), vec!["1", "2", "3", "4", "5"]);
        assert_eq!(
            remote.applied()[2].item(),
            Some(&json!({"id": "3", "version": 8}))
        );
    }

    #[test]
    fn offline_row_stops_push_without_recording_errors() {
        let fixture = TestQueue::memory();
        for id in ["1", "2", "3"] {
            fixture.queue.enqueue(insert_op("todo", id)).unwrap();
        }
        let mut remote = ScriptedRemote::new().offline_at("todo", "2");

        let summary = push_pending(&fixture.queue, &fixture.errors, &mut remote).unwrap();
        assert_eq!(summary.pushed, 1);
        assert_eq!(summary.interrupted.as_deref(), Some("backend unreachable"));
        assert_eq!(fixture.errors.count_pending(), 0);
        assert_eq!(fixture.queue.peek().unwrap().item_id(), "2");
    }

    #[test]
    fn push_skips_operations_enqueued_during_the_pass() {
        let fixture = TestQueue::memory();
        fixture.queue.enqueue(insert_op("todo", "1")).unwrap();
        fixture.queue.enqueue(insert_op("todo", "2")).unwrap();

        let queue = &fixture.queue;
        let mut applier = |op: &PendingOperation| -> Result<(), ApplyError> {
            if op.item_id() == "1" {
                queue.enqueue(insert_op("todo", "late")).unwrap();
            }
            Ok(())
        };

        // The applier enqueues while the pass holds its bookmark.
        let summary = push_pending(queue, &fixture.errors, &mut applier).unwrap();
        assert_eq!(summary.pushed, 2);
        assert_eq!(fixture.queue.count_pending(), 1);
        assert_eq!(fixture.queue.peek().unwrap().item_id(), "late");
    }

    #[test]
    fn store_rows_use_documented_columns() {
        let fixture = TestQueue::memory();
        fixture.queue.enqueue(update_op("todo", "1", 3)).unwrap();
        let rows = fixture.store.read("__operations", &Query::all()).unwrap();
        assert_eq!(rows.len(), 1);

        let columns: Vec<_> = rows[0].iter().map(|(name, _)| name.to_string()).collect();
        assert_eq!(
            columns,
            vec![
                "__createdat",
                "id",
                "item",
                "itemid",
                "operationkind",
                "sequence",
                "tablename"
            ]
        );
        assert_eq!(
            rows[0].get("operationkind").and_then(|v| v.as_integer()),
            Some(1)
        );
        let created = rows[0].get("__createdat").and_then(|v| v.as_text()).unwrap();
        assert!(created.ends_with('Z'));
        assert_eq!(created.len(), "2024-01-01T00:00:00.000Z".len());
    }
}

//! Test fixtures and queue helpers.
//!
//! Provides convenience functions for setting up queues and error lists over
//! temporary stores, and for simulating a restart.

use offsync_core::{Config, OperationErrorList, OperationQueue, PendingOperation};
use offsync_store::{FileStore, InMemoryStore, Store};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use tempfile::TempDir;

static TRACING: Once = Once::new();

/// Installs a test tracing subscriber once per process.
///
/// The filter comes from `RUST_LOG`; output goes through the test harness's
/// captured writer.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A queue and error list over a temporary store, with automatic cleanup.
pub struct TestQueue {
    /// The shared store.
    pub store: Arc<dyn Store>,
    /// The operation queue.
    pub queue: OperationQueue,
    /// The operation error list.
    pub errors: OperationErrorList,
    config: Config,
    log_path: Option<PathBuf>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestQueue {
    /// Creates a fixture over a new in-memory store.
    pub fn memory() -> Self {
        Self::with_store(Arc::new(InMemoryStore::new()), Config::default(), None, None)
    }

    /// Creates a fixture over a new file store in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let log_path = temp_dir.path().join("offsync.log");
        let store = FileStore::open(&log_path).expect("Failed to open file store");
        Self::with_store(
            Arc::new(store),
            Config::default(),
            Some(log_path),
            Some(temp_dir),
        )
    }

    /// Creates a fixture over a caller-supplied store.
    pub fn over(store: Arc<dyn Store>) -> Self {
        Self::with_store(store, Config::default(), None, None)
    }

    fn with_store(
        store: Arc<dyn Store>,
        config: Config,
        log_path: Option<PathBuf>,
        temp_dir: Option<TempDir>,
    ) -> Self {
        init_tracing();
        let queue = OperationQueue::load(Arc::clone(&store), &config).expect("Failed to load queue");
        let errors =
            OperationErrorList::load(Arc::clone(&store), &config).expect("Failed to load errors");
        Self {
            store,
            queue,
            errors,
            config,
            log_path,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the store log path if file-based, None if in-memory.
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Simulates a restart: drops the queue and error list and loads them
    /// again. A file store is closed and reopened from disk.
    pub fn reload(self) -> Self {
        let Self {
            store,
            queue,
            errors,
            config,
            log_path,
            _temp_dir: temp_dir,
        } = self;
        drop(queue);
        drop(errors);

        let store: Arc<dyn Store> = match &log_path {
            Some(path) => {
                drop(store);
                Arc::new(FileStore::open(path).expect("Failed to reopen file store"))
            }
            None => store,
        };
        Self::with_store(store, config, log_path, temp_dir)
    }

    /// Drains the queue directly and returns the item ids in order.
    pub fn drain_item_ids(&self) -> Vec<String> {
        std::iter::from_fn(|| self.queue.dequeue().expect("Failed to dequeue"))
            .map(|op| op.item_id().to_string())
            .collect()
    }
}

/// Creates an insert whose payload carries the item id.
pub fn insert_op(table: &str, item_id: &str) -> PendingOperation {
    PendingOperation::insert(table, item_id, json!({ "id": item_id, "version": 0 }))
}

/// Creates an update whose payload carries the item id and a version.
pub fn update_op(table: &str, item_id: &str, version: i64) -> PendingOperation {
    PendingOperation::update(table, item_id, json!({ "id": item_id, "version": version }))
}

/// Creates a delete.
pub fn delete_op(table: &str, item_id: &str) -> PendingOperation {
    PendingOperation::delete(table, item_id)
}

/// Runs a test with an in-memory fixture.
pub fn with_memory_queue<F, R>(f: F) -> R
where
    F: FnOnce(&TestQueue) -> R,
{
    let fixture = TestQueue::memory();
    f(&fixture)
}

/// Runs a test with a file-backed fixture.
pub fn with_file_queue<F, R>(f: F) -> R
where
    F: FnOnce(&TestQueue) -> R,
{
    let fixture = TestQueue::file();
    f(&fixture)
}

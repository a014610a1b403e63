//! The durable operation queue and its bookmarks.

use offsync_store::{Direction, Query, Store};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::collapse::{CollapseOutcome, Collapser, DefaultCollapser};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::operation::{ItemKey, OperationKind, PendingOperation};
use crate::rows;

/// Load generations handed out to queues in this process.
static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

/// Queue position: `(epoch, sequence)`.
type Position = (u64, u64);

/// One slot of the queue.
#[derive(Debug)]
struct QueuedEntry {
    op: PendingOperation,
    cancelled: bool,
}

/// A bookmark's snapshot of the queue tail.
#[derive(Debug)]
struct Marker {
    id: u64,
    position: Position,
    cancelled: bool,
}

#[derive(Debug)]
struct QueueState {
    entries: BTreeMap<Position, QueuedEntry>,
    items: HashMap<ItemKey, Position>,
    tables: HashMap<String, usize>,
    live: usize,
    epoch: u64,
    next_sequence: u64,
    bookmarks: VecDeque<Marker>,
    next_bookmark: u64,
}

impl QueueState {
    fn new(epoch: u64) -> Self {
        Self {
            entries: BTreeMap::new(),
            items: HashMap::new(),
            tables: HashMap::new(),
            live: 0,
            epoch,
            next_sequence: 1,
            bookmarks: VecDeque::new(),
            next_bookmark: 1,
        }
    }

    fn next_position(&self) -> Position {
        (self.epoch, self.next_sequence)
    }

    fn live_entry(&self, key: &ItemKey) -> Option<(Position, &PendingOperation)> {
        let position = *self.items.get(key)?;
        self.entries
            .get(&position)
            .filter(|entry| !entry.cancelled)
            .map(|entry| (position, &entry.op))
    }

    fn head(&self) -> Option<(Position, &PendingOperation)> {
        self.entries
            .iter()
            .find(|(_, entry)| !entry.cancelled)
            .map(|(position, entry)| (*position, &entry.op))
    }

    fn append(&mut self, position: Position, op: PendingOperation) {
        self.next_sequence = self.next_sequence.max(position.1 + 1);
        *self.tables.entry(op.table_name().to_string()).or_insert(0) += 1;
        self.items.insert(op.key(), position);
        self.entries.insert(
            position,
            QueuedEntry {
                op,
                cancelled: false,
            },
        );
        self.live += 1;
    }

    fn cancel(&mut self, position: Position) {
        let Some(entry) = self.entries.get_mut(&position) else {
            return;
        };
        if entry.cancelled {
            return;
        }
        entry.cancelled = true;
        let op = entry.op.clone();
        self.forget(&op);
    }

    fn remove(&mut self, position: Position) -> Option<PendingOperation> {
        let entry = self.entries.remove(&position)?;
        if !entry.cancelled {
            self.forget(&entry.op);
        }
        Some(entry.op)
    }

    fn forget(&mut self, op: &PendingOperation) {
        self.items.remove(&op.key());
        if let Some(count) = self.tables.get_mut(op.table_name()) {
            *count -= 1;
            if *count == 0 {
                self.tables.remove(op.table_name());
            }
        }
        self.live -= 1;
    }

    fn prune_head(&mut self) {
        while let Some(entry) = self.entries.first_entry() {
            if !entry.get().cancelled {
                break;
            }
            entry.remove();
        }
    }

    fn marker(&self, id: u64) -> Option<&Marker> {
        self.bookmarks.iter().find(|marker| marker.id == id)
    }

    fn check_current(&self, id: u64) -> CoreResult<Position> {
        let marker = self
            .marker(id)
            .filter(|marker| !marker.cancelled)
            .ok_or_else(|| CoreError::invalid_state("bookmark is cancelled"))?;
        match self.bookmarks.front() {
            Some(front) if front.id == id => Ok(marker.position),
            _ => Err(CoreError::invalid_state(
                "bookmark is not current; an older bookmark is still live",
            )),
        }
    }
}

/// Ordered, durable queue holding at most one pending operation per row.
///
/// Operations dequeue in the order they were first enqueued. Enqueueing an
/// operation for a row that already has one consults the [`Collapser`].
///
/// # Durability
///
/// Every state change writes the store before touching memory. A store
/// failure is returned as [`CoreError::Storage`] and leaves the queue as it
/// was.
///
/// # Thread Safety
///
/// All state sits behind one task-fair `RwLock`. Reads share it; mutations
/// and bookmark changes take it exclusively, including the store I/O.
///
/// # Example
///
/// ```rust
/// use offsync_core::{Config, OperationQueue, PendingOperation};
/// use offsync_store::InMemoryStore;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let queue = OperationQueue::load(Arc::new(InMemoryStore::new()), &Config::default()).unwrap();
/// queue.enqueue(PendingOperation::insert("todo", "1", json!({"text": "milk"}))).unwrap();
/// queue.enqueue(PendingOperation::insert("todo", "2", json!({"text": "eggs"}))).unwrap();
///
/// let bookmark = queue.bookmark();
/// while let Some(op) = bookmark.dequeue().unwrap() {
///     println!("push {} {}", op.kind(), op.item_id());
/// }
/// assert_eq!(queue.count_pending(), 0);
/// ```
pub struct OperationQueue {
    store: Arc<dyn Store>,
    table: String,
    collapser: Box<dyn Collapser>,
    state: RwLock<QueueState>,
}

impl OperationQueue {
    /// Loads the queue with the [`DefaultCollapser`].
    ///
    /// # Errors
    ///
    /// See [`OperationQueue::load_with_collapser`].
    pub fn load(store: Arc<dyn Store>, config: &Config) -> CoreResult<Self> {
        Self::load_with_collapser(store, config, DefaultCollapser)
    }

    /// Loads the queue from the store, defining its table if needed.
    ///
    /// Rows are restored in persisted sequence order under a fresh epoch. If
    /// two rows target the same row (a replace interrupted between its two
    /// writes), the later one wins and the earlier row is deleted.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the table cannot be defined, read or
    /// repaired, and a deserialization error if any row cannot be decoded.
    pub fn load_with_collapser(
        store: Arc<dyn Store>,
        config: &Config,
        collapser: impl Collapser + 'static,
    ) -> CoreResult<Self> {
        let table = config.queue_table.clone();
        store.define_table(rows::queue_schema(&table))?;

        let stored = store.read(
            &table,
            &Query::all().order_by(rows::SEQUENCE, Direction::Ascending),
        )?;

        let epoch = NEXT_EPOCH.fetch_add(1, Ordering::Relaxed);
        let mut state = QueueState::new(epoch);
        let mut stale = Vec::new();

        for row in &stored {
            let (op, sequence) = rows::decode_operation(&table, row)?;
            let previous = state.live_entry(&op.key()).map(|(position, _)| position);
            if let Some(position) = previous {
                if let Some(old) = state.remove(position) {
                    stale.push(old);
                }
            }
            state.append((epoch, sequence), op);
        }

        for op in &stale {
            store.delete(&table, op.id())?;
        }
        if !stale.is_empty() {
            info!(table = %table, removed = stale.len(), "removed superseded queue rows");
        }

        info!(
            table = %table,
            epoch,
            pending = state.live,
            next_sequence = state.next_sequence,
            "loaded operation queue"
        );
        Ok(Self {
            store,
            table,
            collapser: Box::new(collapser),
            state: RwLock::new(state),
        })
    }

    /// Adds an operation, collapsing it with any queued operation for the
    /// same row.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store write fails. The queue is then
    /// unchanged.
    pub fn enqueue(&self, op: PendingOperation) -> CoreResult<()> {
        let mut state = self.state.write();
        let key = op.key();

        let Some((position, existing)) = state
            .live_entry(&key)
            .map(|(position, existing)| (position, existing.clone()))
        else {
            let position = state.next_position();
            self.store
                .upsert(&self.table, rows::encode_operation(&op, position.1))?;
            debug!(
                table = op.table_name(),
                item_id = op.item_id(),
                sequence = position.1,
                kind = %op.kind(),
                "enqueued operation"
            );
            state.append(position, op);
            return Ok(());
        };

        let outcome = self.collapser.collapse(&existing, &op);
        let label = match &outcome {
            CollapseOutcome::Cancel => {
                self.store.delete(&self.table, existing.id())?;
                state.cancel(position);
                "cancel"
            }
            CollapseOutcome::Replace => {
                let next = state.next_position();
                self.store
                    .upsert(&self.table, rows::encode_operation(&op, next.1))?;
                if let Err(e) = self.store.delete(&self.table, existing.id()) {
                    if let Err(rollback) = self.store.delete(&self.table, op.id()) {
                        warn!(
                            table = op.table_name(),
                            item_id = op.item_id(),
                            error = %rollback,
                            "failed to roll back replacement row"
                        );
                    }
                    return Err(e.into());
                }
                state.cancel(position);
                state.append(next, op);
                "replace"
            }
            CollapseOutcome::MergeInPlace { kind, item } => {
                let merged = existing.merged(*kind, item.clone());
                self.store
                    .upsert(&self.table, rows::encode_operation(&merged, position.1))?;
                if let Some(entry) = state.entries.get_mut(&position) {
                    entry.op = merged;
                }
                "merge"
            }
        };
        state.prune_head();

        debug!(
            table = %key.table_name,
            item_id = %key.item_id,
            sequence = position.1,
            outcome = label,
            "collapsed operation"
        );
        Ok(())
    }

    /// Removes and returns the oldest pending operation, ignoring bookmarks.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the row cannot be deleted. The operation
    /// then stays queued.
    pub fn dequeue(&self) -> CoreResult<Option<PendingOperation>> {
        let mut state = self.state.write();
        self.dequeue_before(&mut state, None)
    }

    fn dequeue_before(
        &self,
        state: &mut QueueState,
        limit: Option<Position>,
    ) -> CoreResult<Option<PendingOperation>> {
        state.prune_head();
        let Some((position, id)) = state
            .head()
            .map(|(position, op)| (position, op.id().to_string()))
        else {
            return Ok(None);
        };
        if limit.is_some_and(|limit| position >= limit) {
            return Ok(None);
        }

        self.store.delete(&self.table, &id)?;
        let op = state.remove(position);
        state.prune_head();

        if let Some(op) = &op {
            debug!(
                table = op.table_name(),
                item_id = op.item_id(),
                sequence = position.1,
                "dequeued operation"
            );
        }
        Ok(op)
    }

    /// Returns the oldest pending operation without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<PendingOperation> {
        self.state.read().head().map(|(_, op)| op.clone())
    }

    /// Returns the number of pending operations.
    #[must_use]
    pub fn count_pending(&self) -> usize {
        self.state.read().live
    }

    /// Returns the number of pending operations for one table.
    #[must_use]
    pub fn count_pending_for(&self, table_name: &str) -> usize {
        self.state
            .read()
            .tables
            .get(table_name)
            .copied()
            .unwrap_or(0)
    }

    /// Returns the pending operation for a row, if any.
    #[must_use]
    pub fn pending_operation(&self, table_name: &str, item_id: &str) -> Option<PendingOperation> {
        self.state
            .read()
            .live_entry(&ItemKey::new(table_name, item_id))
            .map(|(_, op)| op.clone())
    }

    /// Snapshots the queue tail.
    ///
    /// The bookmark sees only operations enqueued before this call. Only the
    /// oldest live bookmark may dequeue. Dropping the bookmark releases it.
    pub fn bookmark(&self) -> Bookmark<'_> {
        let mut state = self.state.write();
        let id = state.next_bookmark;
        state.next_bookmark += 1;
        let position = state.next_position();
        state.bookmarks.push_back(Marker {
            id,
            position,
            cancelled: false,
        });
        debug!(bookmark = id, sequence = position.1, "created bookmark");
        Bookmark {
            queue: self,
            id,
            position,
        }
    }

    /// Releases a bookmark. Releasing twice is a no-op, and so is passing a
    /// bookmark taken from another queue.
    pub fn unbookmark(&self, bookmark: &Bookmark<'_>) {
        if std::ptr::eq(bookmark.queue, self) {
            self.release(bookmark.id);
        }
    }

    fn release(&self, id: u64) {
        let mut state = self.state.write();
        let Some(marker) = state.bookmarks.iter_mut().find(|marker| marker.id == id) else {
            return;
        };
        if marker.cancelled {
            return;
        }
        marker.cancelled = true;
        while state.bookmarks.front().is_some_and(|marker| marker.cancelled) {
            state.bookmarks.pop_front();
        }
        debug!(bookmark = id, live = state.bookmarks.len(), "released bookmark");
    }
}

impl std::fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("OperationQueue")
            .field("table", &self.table)
            .field("epoch", &state.epoch)
            .field("pending", &state.live)
            .field("bookmarks", &state.bookmarks.len())
            .finish_non_exhaustive()
    }
}

/// What became of an operation after it was handed to the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentOutcome {
    /// The queued operation was unchanged and has been removed.
    Removed,
    /// A newer local change was merged into the operation while it was in
    /// flight. It stays queued at its position.
    Changed,
    /// The operation is no longer queued, so nothing was removed.
    Gone,
}

/// Kind the remaining local change takes once `sent` reached the server.
fn rebased_kind(sent: OperationKind, current: OperationKind) -> OperationKind {
    match (sent, current) {
        (_, OperationKind::Delete) => OperationKind::Delete,
        (OperationKind::Delete, _) => OperationKind::Insert,
        _ => OperationKind::Update,
    }
}

/// A snapshot of the queue tail used by one sync pass.
///
/// Obtained from [`OperationQueue::bookmark`]. It yields operations that were
/// queued before it was taken, in order, and only while it is the oldest live
/// bookmark.
pub struct Bookmark<'q> {
    queue: &'q OperationQueue,
    id: u64,
    position: Position,
}

impl Bookmark<'_> {
    /// Removes and returns the oldest operation visible to this bookmark.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if the bookmark is cancelled or
    /// not current, and a storage error if the row cannot be deleted.
    pub fn dequeue(&self) -> CoreResult<Option<PendingOperation>> {
        let mut state = self.queue.state.write();
        let limit = state.check_current(self.id)?;
        self.queue.dequeue_before(&mut state, Some(limit))
    }

    /// Removes `sent` after it was handed to the remote, if it is still
    /// queued unchanged.
    ///
    /// Producers may enqueue while an operation is in flight. If a newer
    /// change was merged into it, the entry stays queued; when `applied` is
    /// true its kind is rebased on what the server now holds, so a merged
    /// insert goes out as an update and a merged re-insert after a delete
    /// goes out as an insert. If the entry was cancelled or replaced,
    /// nothing is removed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if the bookmark is cancelled or
    /// not current, and a storage error if the row cannot be deleted or
    /// rewritten. The queue is then unchanged.
    pub fn dequeue_sent(&self, sent: &PendingOperation, applied: bool) -> CoreResult<SentOutcome> {
        let mut state = self.queue.state.write();
        let limit = state.check_current(self.id)?;
        let Some((position, current)) = state
            .live_entry(&sent.key())
            .filter(|(position, op)| *position < limit && op.id() == sent.id())
            .map(|(position, op)| (position, op.clone()))
        else {
            debug!(
                table = sent.table_name(),
                item_id = sent.item_id(),
                "sent operation no longer queued"
            );
            return Ok(SentOutcome::Gone);
        };

        if current == *sent {
            self.queue.store.delete(&self.queue.table, sent.id())?;
            state.remove(position);
            state.prune_head();
            debug!(
                table = sent.table_name(),
                item_id = sent.item_id(),
                sequence = position.1,
                "dequeued sent operation"
            );
            return Ok(SentOutcome::Removed);
        }

        let kind = rebased_kind(sent.kind(), current.kind());
        if applied && kind != current.kind() {
            let rebased = current.merged(kind, current.item().cloned());
            self.queue
                .store
                .upsert(&self.queue.table, rows::encode_operation(&rebased, position.1))?;
            if let Some(entry) = state.entries.get_mut(&position) {
                entry.op = rebased;
            }
        }
        debug!(
            table = sent.table_name(),
            item_id = sent.item_id(),
            sequence = position.1,
            "sent operation changed in flight"
        );
        Ok(SentOutcome::Changed)
    }

    /// Returns the oldest operation visible to this bookmark.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if the bookmark is cancelled or
    /// not current.
    pub fn peek(&self) -> CoreResult<Option<PendingOperation>> {
        let state = self.queue.state.read();
        let limit = state.check_current(self.id)?;
        Ok(state
            .head()
            .filter(|(position, _)| *position < limit)
            .map(|(_, op)| op.clone()))
    }

    /// Returns true if this is the oldest live bookmark.
    #[must_use]
    pub fn is_current_bookmark(&self) -> bool {
        let state = self.queue.state.read();
        state
            .bookmarks
            .front()
            .is_some_and(|front| front.id == self.id && !front.cancelled)
    }

    /// Returns true once the bookmark has been released.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.queue
            .state
            .read()
            .marker(self.id)
            .map_or(true, |marker| marker.cancelled)
    }
}

impl std::fmt::Debug for Bookmark<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bookmark")
            .field("id", &self.id)
            .field("epoch", &self.position.0)
            .field("sequence", &self.position.1)
            .finish()
    }
}

impl Drop for Bookmark<'_> {
    fn drop(&mut self) {
        self.queue.release(self.id);
    }
}

//! Property-based test generators using proptest.
//!
//! Provides strategies for generating operation streams that hit the same
//! rows often, plus a reference model of the default collapse policy.

use offsync_core::{
    CollapseOutcome, Collapser, DefaultCollapser, ItemKey, OperationKind, PendingOperation,
};
use proptest::prelude::*;
use serde_json::json;

/// Strategy for generating operation kinds.
pub fn operation_kind_strategy() -> impl Strategy<Value = OperationKind> {
    prop_oneof![
        Just(OperationKind::Insert),
        Just(OperationKind::Update),
        Just(OperationKind::Delete),
    ]
}

/// Strategy for generating table names from a small pool.
pub fn table_name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["todo", "notes", "tags"]).prop_map(str::to_string)
}

/// Strategy for generating item ids from a small pool, so rows collide.
pub fn item_id_strategy() -> impl Strategy<Value = String> {
    (0u8..6).prop_map(|n| format!("item-{n}"))
}

/// Strategy for generating row payloads.
pub fn payload_strategy() -> impl Strategy<Value = serde_json::Value> {
    (any::<i32>(), prop::string::string_regex("[a-z ]{0,12}").expect("Invalid regex"))
        .prop_map(|(version, text)| json!({ "version": version, "text": text }))
}

/// Strategy for generating pending operations.
pub fn pending_operation_strategy() -> impl Strategy<Value = PendingOperation> {
    (
        operation_kind_strategy(),
        table_name_strategy(),
        item_id_strategy(),
        payload_strategy(),
    )
        .prop_map(|(kind, table, item_id, payload)| {
            let item = (kind != OperationKind::Delete).then_some(payload);
            PendingOperation::new(kind, table, item_id, item)
        })
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<PendingOperation>> {
    prop::collection::vec(pending_operation_strategy(), min_ops..max_ops)
}

/// What the queue should hold for one row.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEntry {
    /// Target row.
    pub key: ItemKey,
    /// Expected kind.
    pub kind: OperationKind,
    /// Expected payload.
    pub item: Option<serde_json::Value>,
}

/// Reference model of a queue using [`DefaultCollapser`].
///
/// Keeps live entries in dequeue order with a plain vector.
#[derive(Debug, Clone, Default)]
pub struct QueueModel {
    entries: Vec<ModelEntry>,
}

impl QueueModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one enqueue.
    pub fn enqueue(&mut self, op: &PendingOperation) {
        let key = op.key();
        let Some(index) = self.entries.iter().position(|entry| entry.key == key) else {
            self.entries.push(ModelEntry {
                key,
                kind: op.kind(),
                item: op.item().cloned(),
            });
            return;
        };

        let current = &self.entries[index];
        let existing = PendingOperation::new(
            current.kind,
            key.table_name.clone(),
            key.item_id.clone(),
            current.item.clone(),
        );
        match DefaultCollapser.collapse(&existing, op) {
            CollapseOutcome::Cancel => {
                self.entries.remove(index);
            }
            CollapseOutcome::Replace => {
                self.entries.remove(index);
                self.entries.push(ModelEntry {
                    key,
                    kind: op.kind(),
                    item: op.item().cloned(),
                });
            }
            CollapseOutcome::MergeInPlace { kind, item } => {
                self.entries[index].kind = kind;
                self.entries[index].item = item;
            }
        }
    }

    /// Removes the head entry.
    pub fn dequeue(&mut self) -> Option<ModelEntry> {
        (!self.entries.is_empty()).then(|| self.entries.remove(0))
    }

    /// Returns the live entries in dequeue order.
    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }

    /// Returns the number of live entries for a table.
    pub fn count_for(&self, table: &str) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.key.table_name == table)
            .count()
    }
}

/// Converts a dequeued operation into a model entry for comparison.
pub fn model_entry(op: &PendingOperation) -> ModelEntry {
    ModelEntry {
        key: op.key(),
        kind: op.kind(),
        item: op.item().cloned(),
    }
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestQueue;
    use std::collections::HashSet;

    proptest! {
        #![proptest_config(PropTestConfig::default().to_proptest_config())]

        #[test]
        fn deletes_carry_no_payload(op in pending_operation_strategy()) {
            prop_assert_eq!(op.item().is_none(), op.kind() == OperationKind::Delete);
        }

        #[test]
        fn at_most_one_entry_per_row(ops in operation_sequence_strategy(1, 60)) {
            let fixture = TestQueue::memory();
            for op in &ops {
                fixture.queue.enqueue(op.clone()).unwrap();
            }

            let mut seen = HashSet::new();
            let mut drained = 0;
            while let Some(op) = fixture.queue.dequeue().unwrap() {
                prop_assert!(seen.insert(op.key()), "two entries for {}", op.key());
                drained += 1;
            }
            prop_assert_eq!(drained, seen.len());
        }

        #[test]
        fn queue_matches_model(ops in operation_sequence_strategy(1, 60)) {
            let fixture = TestQueue::memory();
            let mut model = QueueModel::new();
            for op in &ops {
                fixture.queue.enqueue(op.clone()).unwrap();
                model.enqueue(op);
                prop_assert_eq!(fixture.queue.count_pending(), model.entries().len());
            }
            for table in ["todo", "notes", "tags"] {
                prop_assert_eq!(fixture.queue.count_pending_for(table), model.count_for(table));
            }

            while let Some(op) = fixture.queue.dequeue().unwrap() {
                prop_assert_eq!(Some(model_entry(&op)), model.dequeue());
            }
            prop_assert!(model.dequeue().is_none());
        }
    }

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn reload_matches_model(ops in operation_sequence_strategy(1, 40)) {
            let fixture = TestQueue::file();
            let mut model = QueueModel::new();
            for op in &ops {
                fixture.queue.enqueue(op.clone()).unwrap();
                model.enqueue(op);
            }

            let fixture = fixture.reload();
            prop_assert_eq!(fixture.queue.count_pending(), model.entries().len());
            while let Some(op) = fixture.queue.dequeue().unwrap() {
                prop_assert_eq!(Some(model_entry(&op)), model.dequeue());
            }
        }
    }

    #[test]
    fn model_collapses_insert_update_delete() {
        let mut model = QueueModel::new();
        model.enqueue(&PendingOperation::insert("T", "x", json!({"v": 1})));
        model.enqueue(&PendingOperation::update("T", "x", json!({"v": 2})));
        assert_eq!(model.entries()[0].kind, OperationKind::Insert);
        model.enqueue(&PendingOperation::delete("T", "x"));
        assert!(model.entries().is_empty());
    }
}

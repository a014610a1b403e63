//! Collapsing of redundant operations on the same row.

use crate::operation::{OperationKind, PendingOperation};

/// What to do when an operation is enqueued for a row that already has one.
#[derive(Debug, Clone, PartialEq)]
pub enum CollapseOutcome {
    /// Drop the queued operation and do not enqueue the incoming one.
    Cancel,
    /// Drop the queued operation and enqueue the incoming one at the tail.
    Replace,
    /// Keep the queued operation's position, id and creation time, and
    /// rewrite its kind and payload.
    MergeInPlace {
        /// Resulting kind.
        kind: OperationKind,
        /// Resulting payload.
        item: Option<serde_json::Value>,
    },
}

/// Policy deciding how two operations on the same row combine.
///
/// Implementations must be pure: the queue calls `collapse` while holding its
/// exclusive lock.
pub trait Collapser: Send + Sync {
    /// Combines the queued `existing` operation with `incoming`.
    fn collapse(&self, existing: &PendingOperation, incoming: &PendingOperation)
        -> CollapseOutcome;
}

/// The built-in collapse policy.
///
/// | existing \ incoming | Insert | Update | Delete |
/// |---|---|---|---|
/// | Insert | merge as Insert | merge as Insert | cancel |
/// | Update | merge as Update | merge as Update | replace |
/// | Delete | merge as Update | keep Delete | keep Delete |
///
/// An insert that never reached the server disappears together with a later
/// delete. A row deleted and re-inserted locally goes out as an update.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCollapser;

impl Collapser for DefaultCollapser {
    fn collapse(
        &self,
        existing: &PendingOperation,
        incoming: &PendingOperation,
    ) -> CollapseOutcome {
        use OperationKind::{Delete, Insert, Update};

        let merge = |kind| CollapseOutcome::MergeInPlace {
            kind,
            item: incoming.item().cloned(),
        };

        match (existing.kind(), incoming.kind()) {
            (Insert, Insert | Update) => merge(Insert),
            (Insert, Delete) => CollapseOutcome::Cancel,
            (Update, Insert | Update) => merge(Update),
            (Update, Delete) => CollapseOutcome::Replace,
            (Delete, Insert) => merge(Update),
            (Delete, Update | Delete) => CollapseOutcome::MergeInPlace {
                kind: Delete,
                item: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op(kind: OperationKind, v: i64) -> PendingOperation {
        let item = (kind != OperationKind::Delete).then(|| json!({ "v": v }));
        PendingOperation::new(kind, "todo", "x", item)
    }

    fn collapse(existing: OperationKind, incoming: OperationKind) -> CollapseOutcome {
        DefaultCollapser.collapse(&op(existing, 1), &op(incoming, 2))
    }

    #[test]
    fn insert_then_update_stays_insert_with_new_payload() {
        assert_eq!(
            collapse(OperationKind::Insert, OperationKind::Update),
            CollapseOutcome::MergeInPlace {
                kind: OperationKind::Insert,
                item: Some(json!({"v": 2})),
            }
        );
    }

    #[test]
    fn insert_then_delete_cancels() {
        assert_eq!(
            collapse(OperationKind::Insert, OperationKind::Delete),
            CollapseOutcome::Cancel
        );
    }

    #[test]
    fn update_then_delete_replaces() {
        assert_eq!(
            collapse(OperationKind::Update, OperationKind::Delete),
            CollapseOutcome::Replace
        );
    }

    #[test]
    fn update_then_update_merges() {
        assert_eq!(
            collapse(OperationKind::Update, OperationKind::Update),
            CollapseOutcome::MergeInPlace {
                kind: OperationKind::Update,
                item: Some(json!({"v": 2})),
            }
        );
    }

    #[test]
    fn delete_then_insert_becomes_update() {
        assert_eq!(
            collapse(OperationKind::Delete, OperationKind::Insert),
            CollapseOutcome::MergeInPlace {
                kind: OperationKind::Update,
                item: Some(json!({"v": 2})),
            }
        );
    }

    #[test]
    fn delete_absorbs_update_and_delete() {
        for incoming in [OperationKind::Update, OperationKind::Delete] {
            assert_eq!(
                collapse(OperationKind::Delete, incoming),
                CollapseOutcome::MergeInPlace {
                    kind: OperationKind::Delete,
                    item: None,
                }
            );
        }
    }

    fn kind_strategy() -> impl proptest::strategy::Strategy<Value = OperationKind> {
        proptest::prop_oneof![
            proptest::strategy::Just(OperationKind::Insert),
            proptest::strategy::Just(OperationKind::Update),
            proptest::strategy::Just(OperationKind::Delete),
        ]
    }

    proptest::proptest! {
        #[test]
        fn merged_deletes_never_carry_a_payload(
            existing in kind_strategy(),
            incoming in kind_strategy(),
        ) {
            if let CollapseOutcome::MergeInPlace { kind, item } = collapse(existing, incoming) {
                proptest::prop_assert_eq!(item.is_none(), kind == OperationKind::Delete);
            }
        }
    }
}

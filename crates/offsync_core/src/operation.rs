//! Pending operations.

use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

use crate::date;

/// The kind of a local mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// A new row.
    Insert,
    /// A change to an existing row.
    Update,
    /// Removal of a row.
    Delete,
}

impl OperationKind {
    /// Returns the persisted integer code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Insert => 0,
            Self::Update => 1,
            Self::Delete => 2,
        }
    }

    /// Decodes a persisted integer code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Insert),
            1 => Some(Self::Update),
            2 => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// One local mutation intent against one remote-table row.
///
/// The id, table, item id and creation time never change once created. A
/// queued operation's kind and payload may be rewritten by the collapser.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOperation {
    id: String,
    kind: OperationKind,
    table_name: String,
    item_id: String,
    created_at: DateTime<Utc>,
    item: Option<serde_json::Value>,
}

impl PendingOperation {
    /// Creates an operation with a fresh id and the current time.
    #[must_use]
    pub fn new(
        kind: OperationKind,
        table_name: impl Into<String>,
        item_id: impl Into<String>,
        item: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            table_name: table_name.into(),
            item_id: item_id.into(),
            created_at: date::now(),
            item,
        }
    }

    /// Creates an insert carrying the new row.
    #[must_use]
    pub fn insert(
        table_name: impl Into<String>,
        item_id: impl Into<String>,
        item: serde_json::Value,
    ) -> Self {
        Self::new(OperationKind::Insert, table_name, item_id, Some(item))
    }

    /// Creates an update carrying the changed row.
    #[must_use]
    pub fn update(
        table_name: impl Into<String>,
        item_id: impl Into<String>,
        item: serde_json::Value,
    ) -> Self {
        Self::new(OperationKind::Update, table_name, item_id, Some(item))
    }

    /// Creates a delete. Deletes carry no payload.
    #[must_use]
    pub fn delete(table_name: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self::new(OperationKind::Delete, table_name, item_id, None)
    }

    /// Rebuilds an operation from persisted parts.
    pub(crate) fn restore(
        id: String,
        kind: OperationKind,
        table_name: String,
        item_id: String,
        created_at: DateTime<Utc>,
        item: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id,
            kind,
            table_name,
            item_id,
            created_at,
            item,
        }
    }

    /// Returns a copy with the kind and payload replaced.
    pub(crate) fn merged(&self, kind: OperationKind, item: Option<serde_json::Value>) -> Self {
        Self {
            kind,
            item,
            ..self.clone()
        }
    }

    /// Returns the operation id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the operation kind.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Returns the remote table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Returns the remote row's primary key.
    #[must_use]
    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    /// Returns when the operation was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the row payload, if any.
    #[must_use]
    pub fn item(&self) -> Option<&serde_json::Value> {
        self.item.as_ref()
    }

    /// Returns the `(table, item)` identity of the target row.
    #[must_use]
    pub fn key(&self) -> ItemKey {
        ItemKey {
            table_name: self.table_name.clone(),
            item_id: self.item_id.clone(),
        }
    }
}

/// Identity of a remote row: table name plus item id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    /// Remote table name.
    pub table_name: String,
    /// Remote row primary key.
    pub item_id: String,
}

impl ItemKey {
    /// Creates a key.
    #[must_use]
    pub fn new(table_name: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            item_id: item_id.into(),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table_name, self.item_id)
    }
}

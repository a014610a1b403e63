//! Records of operations the server refused.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::date;
use crate::operation::{OperationKind, PendingOperation};

/// A failed attempt to apply a pending operation remotely.
#[derive(Debug, Clone, PartialEq)]
pub struct TableOperationError {
    id: String,
    operation_kind: OperationKind,
    table_name: String,
    item_id: String,
    client_item: Option<serde_json::Value>,
    error_message: String,
    status_code: Option<i64>,
    server_response: Option<String>,
    server_item: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl TableOperationError {
    /// Creates an error for an operation, carrying its payload as the client
    /// item.
    #[must_use]
    pub fn from_operation(op: &PendingOperation, error_message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            operation_kind: op.kind(),
            table_name: op.table_name().to_string(),
            item_id: op.item_id().to_string(),
            client_item: op.item().cloned(),
            error_message: error_message.into(),
            status_code: None,
            server_response: None,
            server_item: None,
            created_at: date::now(),
        }
    }

    /// Sets the HTTP-style status code.
    #[must_use]
    pub fn with_status_code(mut self, code: i64) -> Self {
        self.status_code = Some(code);
        self
    }

    /// Sets the raw server response body.
    #[must_use]
    pub fn with_server_response(mut self, response: impl Into<String>) -> Self {
        self.server_response = Some(response.into());
        self
    }

    /// Sets the server's version of the row.
    #[must_use]
    pub fn with_server_item(mut self, item: serde_json::Value) -> Self {
        self.server_item = Some(item);
        self
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        id: String,
        operation_kind: OperationKind,
        table_name: String,
        item_id: String,
        client_item: Option<serde_json::Value>,
        error_message: String,
        status_code: Option<i64>,
        server_response: Option<String>,
        server_item: Option<serde_json::Value>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            operation_kind,
            table_name,
            item_id,
            client_item,
            error_message,
            status_code,
            server_response,
            server_item,
            created_at,
        }
    }

    /// Returns the error id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the kind of the failed operation.
    #[must_use]
    pub fn operation_kind(&self) -> OperationKind {
        self.operation_kind
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

    /// Returns the payload the client tried to send.
    #[must_use]
    pub fn client_item(&self) -> Option<&serde_json::Value> {
        self.client_item.as_ref()
    }

    /// Returns the error message.
    #[must_use]
    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    /// Returns the status code, if the server sent one.
    #[must_use]
    pub fn status_code(&self) -> Option<i64> {
        self.status_code
    }

    /// Returns the raw server response, if any.
    #[must_use]
    pub fn server_response(&self) -> Option<&str> {
        self.server_response.as_deref()
    }

    /// Returns the server's version of the row, if any.
    #[must_use]
    pub fn server_item(&self) -> Option<&serde_json::Value> {
        self.server_item.as_ref()
    }

    /// Returns when the error was recorded.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

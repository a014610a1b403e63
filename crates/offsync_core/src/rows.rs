//! Persisted row formats of the queue and error tables.

use chrono::{DateTime, Utc};
use offsync_store::{ColumnType, Row, TableSchema, Value, ID_COLUMN};

use crate::date;
use crate::error::{CoreError, CoreResult};
use crate::operation::{OperationKind, PendingOperation};
use crate::table_error::TableOperationError;

pub(crate) const OPERATION_KIND: &str = "operationkind";
pub(crate) const TABLE_NAME: &str = "tablename";
pub(crate) const ITEM_ID: &str = "itemid";
pub(crate) const ITEM: &str = "item";
pub(crate) const CREATED_AT: &str = "__createdat";
pub(crate) const SEQUENCE: &str = "sequence";

pub(crate) const ERROR_MESSAGE: &str = "errormessage";
pub(crate) const SERVER_RESPONSE: &str = "serverresponse";
pub(crate) const STATUS_CODE: &str = "statuscode";
pub(crate) const CLIENT_ITEM: &str = "clientitem";
pub(crate) const SERVER_ITEM: &str = "serveritem";

/// Schema of the pending operation table.
pub(crate) fn queue_schema(table: &str) -> TableSchema {
    TableSchema::new(table)
        .required_column(OPERATION_KIND, ColumnType::Integer)
        .required_column(TABLE_NAME, ColumnType::String)
        .required_column(ITEM_ID, ColumnType::String)
        .column(ITEM, ColumnType::Object)
        .required_column(CREATED_AT, ColumnType::Date)
        .required_column(SEQUENCE, ColumnType::Integer)
}

/// Schema of the operation error table.
pub(crate) fn error_schema(table: &str) -> TableSchema {
    TableSchema::new(table)
        .required_column(TABLE_NAME, ColumnType::String)
        .required_column(ITEM_ID, ColumnType::String)
        .required_column(ERROR_MESSAGE, ColumnType::String)
        .column(SERVER_RESPONSE, ColumnType::String)
        .column(STATUS_CODE, ColumnType::Number)
        .required_column(CREATED_AT, ColumnType::Date)
        .column(CLIENT_ITEM, ColumnType::Object)
        .column(SERVER_ITEM, ColumnType::Object)
        .required_column(OPERATION_KIND, ColumnType::Integer)
}

fn json_cell(item: Option<&serde_json::Value>) -> Value {
    item.cloned().map_or(Value::Null, Value::Json)
}

pub(crate) fn encode_operation(op: &PendingOperation, sequence: u64) -> Row {
    Row::new()
        .with(ID_COLUMN, op.id())
        .with(OPERATION_KIND, op.kind().code())
        .with(TABLE_NAME, op.table_name())
        .with(ITEM_ID, op.item_id())
        .with(ITEM, json_cell(op.item()))
        .with(CREATED_AT, date::format(&op.created_at()))
        // Sequences start at 1 and stay far below i64::MAX.
        .with(SEQUENCE, i64::try_from(sequence).unwrap_or(i64::MAX))
}

pub(crate) fn decode_operation(table: &str, row: &Row) -> CoreResult<(PendingOperation, u64)> {
    let cells = Cells { table, row };
    let sequence = u64::try_from(cells.integer(SEQUENCE)?)
        .map_err(|_| cells.error(format!("negative {SEQUENCE}")))?;
    let op = PendingOperation::restore(
        cells.text(ID_COLUMN)?.to_string(),
        cells.kind()?,
        cells.text(TABLE_NAME)?.to_string(),
        cells.text(ITEM_ID)?.to_string(),
        cells.date(CREATED_AT)?,
        cells.opt_json(ITEM)?,
    );
    Ok((op, sequence))
}

pub(crate) fn encode_error(error: &TableOperationError) -> Row {
    Row::new()
        .with(ID_COLUMN, error.id())
        .with(TABLE_NAME, error.table_name())
        .with(ITEM_ID, error.item_id())
        .with(ERROR_MESSAGE, error.error_message())
        .with(SERVER_RESPONSE, error.server_response())
        .with(STATUS_CODE, error.status_code())
        .with(CREATED_AT, date::format(&error.created_at()))
        .with(CLIENT_ITEM, json_cell(error.client_item()))
        .with(SERVER_ITEM, json_cell(error.server_item()))
        .with(OPERATION_KIND, error.operation_kind().code())
}

pub(crate) fn decode_error(table: &str, row: &Row) -> CoreResult<TableOperationError> {
    let cells = Cells { table, row };
    Ok(TableOperationError::restore(
        cells.text(ID_COLUMN)?.to_string(),
        cells.kind()?,
        cells.text(TABLE_NAME)?.to_string(),
        cells.text(ITEM_ID)?.to_string(),
        cells.opt_json(CLIENT_ITEM)?,
        cells.text(ERROR_MESSAGE)?.to_string(),
        cells.opt_status(STATUS_CODE)?,
        cells.opt_text(SERVER_RESPONSE)?,
        cells.opt_json(SERVER_ITEM)?,
        cells.date(CREATED_AT)?,
    ))
}

/// Converts a float holding a whole number within `i64` range.
fn whole_number(n: f64) -> Option<i64> {
    // i64::MAX rounds up to 2^63 as f64, so the upper bound is exclusive.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    (n.fract() == 0.0 && n >= -LIMIT && n < LIMIT).then(|| n as i64)
}

/// Typed access to the cells of one persisted row.
struct Cells<'a> {
    table: &'a str,
    row: &'a Row,
}

impl<'a> Cells<'a> {
    fn error(&self, message: impl Into<String>) -> CoreError {
        let message = message.into();
        match self.row.id() {
            Some(id) => CoreError::deserialization(self.table, format!("row {id}: {message}")),
            None => CoreError::deserialization(self.table, message),
        }
    }

    fn present(&self, column: &str) -> Option<&'a Value> {
        self.row.get(column).filter(|value| !value.is_null())
    }

    fn text(&self, column: &str) -> CoreResult<&'a str> {
        match self.present(column) {
            Some(Value::Text(text)) => Ok(text),
            Some(other) => Err(self.error(format!("{column} is not text: {other}"))),
            None => Err(self.error(format!("missing {column}"))),
        }
    }

    fn opt_text(&self, column: &str) -> CoreResult<Option<String>> {
        match self.present(column) {
            Some(Value::Text(text)) => Ok(Some(text.clone())),
            Some(other) => Err(self.error(format!("{column} is not text: {other}"))),
            None => Ok(None),
        }
    }

    fn integer(&self, column: &str) -> CoreResult<i64> {
        match self.present(column) {
            Some(Value::Integer(i)) => Ok(*i),
            Some(other) => Err(self.error(format!("{column} is not an integer: {other}"))),
            None => Err(self.error(format!("missing {column}"))),
        }
    }

    fn opt_status(&self, column: &str) -> CoreResult<Option<i64>> {
        match self.present(column) {
            Some(Value::Integer(i)) => Ok(Some(*i)),
            Some(Value::Number(n)) => whole_number(*n)
                .map(Some)
                .ok_or_else(|| self.error(format!("{column} is not a status code: {n}"))),
            Some(other) => Err(self.error(format!("{column} is not a status code: {other}"))),
            None => Ok(None),
        }
    }

    fn kind(&self) -> CoreResult<OperationKind> {
        let code = self.integer(OPERATION_KIND)?;
        OperationKind::from_code(code)
            .ok_or_else(|| self.error(format!("unknown operation kind {code}")))
    }

    fn date(&self, column: &str) -> CoreResult<DateTime<Utc>> {
        let text = self.text(column)?;
        date::parse(text).map_err(|e| self.error(format!("bad {column} {text:?}: {e}")))
    }

    fn opt_json(&self, column: &str) -> CoreResult<Option<serde_json::Value>> {
        match self.present(column) {
            Some(Value::Json(doc)) => Ok(Some(doc.clone())),
            Some(other) => Err(self.error(format!("{column} is not an object: {other}"))),
            None => Ok(None),
        }
    }
}

//! In-memory table image shared by the reference stores.

use crate::error::{StoreError, StoreResult};
use crate::query::Query;
use crate::row::Row;
use crate::schema::TableSchema;
use std::collections::{BTreeMap, HashMap};

/// One table: schema plus rows keyed by insertion slot.
///
/// Slots keep first-insertion order; replacing a row keeps its slot.
#[derive(Debug, Clone)]
struct Table {
    schema: TableSchema,
    rows: BTreeMap<u64, Row>,
    slots: HashMap<String, u64>,
    next_slot: u64,
}

impl Table {
    fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            slots: HashMap::new(),
            next_slot: 0,
        }
    }
}

/// All tables of a store.
#[derive(Debug, Clone, Default)]
pub(crate) struct Tables {
    tables: HashMap<String, Table>,
}

impl Tables {
    /// Defines or redefines a table. Returns true if the schema changed.
    pub(crate) fn define(&mut self, schema: TableSchema) -> bool {
        match self.tables.get_mut(schema.name()) {
            Some(table) if table.schema == schema => false,
            Some(table) => {
                table.schema = schema;
                true
            }
            None => {
                self.tables
                    .insert(schema.name().to_string(), Table::new(schema));
                true
            }
        }
    }

    fn table(&self, name: &str) -> StoreResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::unknown_table(name))
    }

    fn table_mut(&mut self, name: &str) -> StoreResult<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StoreError::unknown_table(name))
    }

    /// Returns the schema of a table, if defined.
    pub(crate) fn schema(&self, table: &str) -> Option<&TableSchema> {
        self.tables.get(table).map(|t| &t.schema)
    }

    /// Returns true if the table holds a row with this id.
    pub(crate) fn contains(&self, table: &str, id: &str) -> StoreResult<bool> {
        Ok(self.table(table)?.slots.contains_key(id))
    }

    /// Validates a row against its table without applying it.
    pub(crate) fn check_upsert(&self, table: &str, row: &Row) -> StoreResult<()> {
        self.table(table)?.schema.validate(row)
    }

    /// Checks that a table exists.
    pub(crate) fn check_table(&self, table: &str) -> StoreResult<()> {
        self.table(table).map(|_| ())
    }

    /// Validates and applies an upsert.
    pub(crate) fn upsert(&mut self, table: &str, row: Row) -> StoreResult<()> {
        let table = self.table_mut(table)?;
        table.schema.validate(&row)?;

        let id = row
            .id()
            .ok_or_else(|| StoreError::MissingId {
                table: table.schema.name().to_string(),
            })?
            .to_string();

        let slot = match table.slots.get(&id) {
            Some(slot) => *slot,
            None => {
                let slot = table.next_slot;
                table.next_slot += 1;
                table.slots.insert(id, slot);
                slot
            }
        };
        table.rows.insert(slot, row);
        Ok(())
    }

    /// Removes a row by id. Returns true if it existed.
    pub(crate) fn delete(&mut self, table: &str, id: &str) -> StoreResult<bool> {
        let table = self.table_mut(table)?;
        Ok(match table.slots.remove(id) {
            Some(slot) => table.rows.remove(&slot).is_some(),
            None => false,
        })
    }

    /// Returns the ids of rows matching a query, in slot order.
    pub(crate) fn matching_ids(&self, table: &str, query: &Query) -> StoreResult<Vec<String>> {
        Ok(self
            .table(table)?
            .rows
            .values()
            .filter(|row| query.matches(row))
            .filter_map(|row| row.id().map(str::to_string))
            .collect())
    }

    /// Reads rows matching a query.
    pub(crate) fn read(&self, table: &str, query: &Query) -> StoreResult<Vec<Row>> {
        let mut rows: Vec<Row> = self
            .table(table)?
            .rows
            .values()
            .filter(|row| query.matches(row))
            .cloned()
            .collect();
        query.sort(&mut rows);
        Ok(rows)
    }

    /// Iterates over every schema and its rows in slot order.
    pub(crate) fn contents(&self) -> impl Iterator<Item = (&TableSchema, Vec<&Row>)> {
        self.tables
            .values()
            .map(|table| (&table.schema, table.rows.values().collect()))
    }
}

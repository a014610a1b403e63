//! # Offsync Store
//!
//! Durable table store contract and reference stores for offsync.
//!
//! This crate provides the lowest-level persistence abstraction for the
//! offline mutation queue. Stores are **schema-checked row stores** - they
//! know tables, columns and `id` keys, but nothing about pending operations
//! or error records.
//!
//! ## Design Principles
//!
//! - Stores hold named tables with a fixed column schema
//! - Rows are keyed by their text `id` column
//! - Must be `Send + Sync` for concurrent access
//! - The queue and error list own their row formats
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral queues
//! - [`FileStore`] - Append-only log file with crash recovery
//!
//! ## Example
//!
//! ```rust
//! use offsync_store::{ColumnType, InMemoryStore, Query, Row, Store, TableSchema};
//!
//! let store = InMemoryStore::new();
//! store
//!     .define_table(TableSchema::new("todo").column("done", ColumnType::Boolean))
//!     .unwrap();
//! store.upsert("todo", Row::new().with("id", "t1").with("done", false)).unwrap();
//! let rows = store.read("todo", &Query::all().filter("done", false)).unwrap();
//! assert_eq!(rows.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod query;
mod row;
mod schema;
mod store;
mod table;
mod value;

pub use error::{StoreError, StoreResult};
pub use file::{FileStore, FileStoreOptions, FRAME_MAGIC};
pub use memory::InMemoryStore;
pub use query::{Direction, Query};
pub use row::{Row, ID_COLUMN};
pub use schema::TableSchema;
pub use store::Store;
pub use value::{ColumnType, Value};

//! # Offsync Core
//!
//! Offline mutation queue and synchronization bookkeeping.
//!
//! This crate provides:
//! - [`PendingOperation`] records of local insert/update/delete intents
//! - [`OperationQueue`] holding at most one operation per row, in order,
//!   with [`Bookmark`]s for interruption-safe sync passes
//! - A pluggable [`Collapser`] policy for redundant operations
//! - [`OperationErrorList`] recording operations the server refused
//! - [`push::push_pending`] draining the queue through a remote applier
//!
//! Everything persists through an [`offsync_store::Store`].
//!
//! ## Example
//!
//! ```rust
//! use offsync_core::{Config, OperationQueue, PendingOperation};
//! use offsync_store::{InMemoryStore, Store};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
//! let queue = OperationQueue::load(Arc::clone(&store), &Config::default()).unwrap();
//!
//! queue.enqueue(PendingOperation::insert("todo", "1", json!({"text": "milk"}))).unwrap();
//! queue.enqueue(PendingOperation::update("todo", "1", json!({"text": "oat milk"}))).unwrap();
//! assert_eq!(queue.count_pending(), 1);
//!
//! // A restart reloads the same operations.
//! drop(queue);
//! let queue = OperationQueue::load(store, &Config::default()).unwrap();
//! assert_eq!(queue.count_pending_for("todo"), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collapse;
mod config;
pub mod date;
mod error;
mod error_list;
mod operation;
pub mod push;
mod queue;
mod rows;
mod table_error;

pub use collapse::{CollapseOutcome, Collapser, DefaultCollapser};
pub use config::{Config, DEFAULT_ERROR_TABLE, DEFAULT_QUEUE_TABLE};
pub use error::{CoreError, CoreResult};
pub use error_list::OperationErrorList;
pub use operation::{ItemKey, OperationKind, PendingOperation};
pub use push::{push_pending, ApplyError, PushSummary, RemoteApplier, RemoteRejection};
pub use queue::{Bookmark, OperationQueue, SentOutcome};
pub use table_error::TableOperationError;

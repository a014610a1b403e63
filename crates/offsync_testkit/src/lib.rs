//! # Offsync Testkit
//!
//! Test utilities for offsync.
//!
//! This crate provides:
//! - Test fixtures with in-memory and file-backed queues
//! - A fault-injecting store for storage failure tests
//! - Property-based test generators using proptest
//! - A producer/consumer stress harness
//! - Cross-crate scenario tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use offsync_testkit::prelude::*;
//!
//! #[test]
//! fn survives_restart() {
//!     let fixture = TestQueue::file();
//!     fixture.queue.enqueue(insert_op("todo", "1")).unwrap();
//!     let fixture = fixture.reload();
//!     assert_eq!(fixture.queue.count_pending(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;

//! Stress tests for the operation queue.
//!
//! These runs verify queue invariants while producers enqueue and a sync
//! consumer drains through bookmarks at the same time.

use offsync_core::{OperationQueue, PendingOperation};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Operations enqueued by all producers.
    pub enqueued: usize,
    /// Operations dequeued by the consumer.
    pub dequeued: usize,
    /// Bookmark passes the consumer made.
    pub passes: usize,
    /// Passes that yielded the same row twice. Must be zero.
    pub duplicate_rows: usize,
    /// Total duration.
    pub duration: Duration,
}

impl StressTestResult {
    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Enqueued: {}", self.enqueued);
        println!("Dequeued: {}", self.dequeued);
        println!("Passes: {}", self.passes);
        println!("Duplicate rows: {}", self.duplicate_rows);
        println!("Duration: {:?}", self.duration);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of producer threads.
    pub producers: usize,
    /// Operations each producer enqueues.
    pub operations_per_producer: usize,
    /// Distinct item ids per table; small values force collapsing.
    pub items: usize,
    /// Tables to spread operations over.
    pub tables: Vec<String>,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            producers: 4,
            operations_per_producer: 500,
            items: 16,
            tables: vec!["todo".to_string(), "notes".to_string()],
        }
    }
}

/// Picks the `i`-th operation of a producer.
fn producer_op(config: &StressConfig, producer: usize, i: usize) -> PendingOperation {
    let table = &config.tables[(producer + i) % config.tables.len()];
    let item_id = format!("item-{}", (i * 7 + producer) % config.items.max(1));
    let payload = json!({ "producer": producer, "step": i });
    match i % 5 {
        0 | 1 => PendingOperation::insert(table.as_str(), item_id, payload),
        2 | 3 => PendingOperation::update(table.as_str(), item_id, payload),
        _ => PendingOperation::delete(table.as_str(), item_id),
    }
}

/// Runs producers against one bookmark consumer until everything drains.
///
/// Each consumer pass takes a bookmark, dequeues until it sees nothing, and
/// counts rows yielded twice within the pass. After producers finish, the
/// queue must drain to empty.
///
/// # Panics
///
/// Panics if an enqueue or dequeue fails.
pub fn stress_producer_consumer(queue: &OperationQueue, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let done = AtomicBool::new(false);

    let (dequeued, passes, duplicate_rows) = thread::scope(|scope| {
        let producers: Vec<_> = (0..config.producers)
            .map(|producer| {
                scope.spawn(move || {
                    for i in 0..config.operations_per_producer {
                        queue
                            .enqueue(producer_op(config, producer, i))
                            .expect("Failed to enqueue");
                    }
                })
            })
            .collect();

        let consumer = scope.spawn(|| {
            let mut dequeued = 0usize;
            let mut passes = 0usize;
            let mut duplicate_rows = 0usize;
            loop {
                let finished = done.load(Ordering::SeqCst);
                let bookmark = queue.bookmark();
                let mut seen = HashSet::new();
                while let Some(op) = bookmark.dequeue().expect("Failed to dequeue") {
                    if !seen.insert(op.key()) {
                        duplicate_rows += 1;
                    }
                    dequeued += 1;
                }
                passes += 1;
                drop(bookmark);
                if finished && queue.count_pending() == 0 {
                    break;
                }
                thread::yield_now();
            }
            (dequeued, passes, duplicate_rows)
        });

        for handle in producers {
            handle.join().expect("Producer panicked");
        }
        done.store(true, Ordering::SeqCst);
        consumer.join().expect("Consumer panicked")
    });

    StressTestResult {
        enqueued: config.producers * config.operations_per_producer,
        dequeued,
        passes,
        duplicate_rows,
        duration: start.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestQueue;

    #[test]
    fn producer_consumer_drains_cleanly() {
        let fixture = TestQueue::memory();
        let config = StressConfig {
            producers: 3,
            operations_per_producer: 200,
            ..StressConfig::default()
        };

        let result = stress_producer_consumer(&fixture.queue, &config);
        result.print_summary("producer/consumer");

        assert_eq!(result.duplicate_rows, 0);
        assert!(result.dequeued <= result.enqueued);
        assert_eq!(fixture.queue.count_pending(), 0);
        for table in &config.tables {
            assert_eq!(fixture.queue.count_pending_for(table), 0);
        }
    }

    #[test]
    fn file_backed_producer_consumer() {
        let fixture = TestQueue::file();
        let config = StressConfig {
            producers: 2,
            operations_per_producer: 100,
            ..StressConfig::default()
        };

        let result = stress_producer_consumer(&fixture.queue, &config);
        assert_eq!(result.duplicate_rows, 0);
        assert_eq!(fixture.queue.count_pending(), 0);

        let fixture = fixture.reload();
        assert_eq!(fixture.queue.count_pending(), 0);
    }

    #[test]
    fn producers_alone_keep_counts_consistent() {
        let fixture = TestQueue::memory();
        let config = StressConfig::default();

        thread::scope(|scope| {
            for producer in 0..config.producers {
                let queue = &fixture.queue;
                let config = &config;
                scope.spawn(move || {
                    for i in 0..config.operations_per_producer {
                        queue.enqueue(producer_op(config, producer, i)).unwrap();
                    }
                });
            }
        });

        let per_table: usize = config
            .tables
            .iter()
            .map(|table| fixture.queue.count_pending_for(table))
            .sum();
        assert_eq!(per_table, fixture.queue.count_pending());
        assert!(fixture.queue.count_pending() <= config.tables.len() * config.items);
    }
}

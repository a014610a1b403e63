//! Queue and error list configuration.

/// Default name of the table holding pending operations.
pub const DEFAULT_QUEUE_TABLE: &str = "__operations";

/// Default name of the table holding operation errors.
pub const DEFAULT_ERROR_TABLE: &str = "__errors";

/// Configuration for loading a queue or error list.
#[derive(Debug, Clone)]
pub struct Config {
    /// Table holding pending operations.
    pub queue_table: String,

    /// Table holding operation errors.
    pub error_table: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_table: DEFAULT_QUEUE_TABLE.to_string(),
            error_table: DEFAULT_ERROR_TABLE.to_string(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the queue table name.
    #[must_use]
    pub fn queue_table(mut self, name: impl Into<String>) -> Self {
        self.queue_table = name.into();
        self
    }

    /// Sets the error table name.
    #[must_use]
    pub fn error_table(mut self, name: impl Into<String>) -> Self {
        self.error_table = name.into();
        self
    }
}

//! Store configuration.
//!
//! [`StoreConfig`] captures the behavior of a [`Store`](crate) instance that
//! is not determined by the adapter: timestamp injection, the reserved
//! transaction collection, and the lock manager's timing knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default name of the reserved collection holding lock entries.
pub const DEFAULT_TRANSACTION_COLLECTION: &str = "_transactions";

/// Default threshold for the slow-critical-section warning: 2 seconds.
const DEFAULT_WARNING_AFTER: Duration = Duration::from_secs(2);

/// Default rescan cadence for lock waiters: 50 milliseconds.
///
/// Waiters in the same process are woken directly on release; this interval
/// only bounds how long a waiter in a *different* process takes to notice.
const DEFAULT_LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for a store instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Stamp `created_at` on every insert.
    pub created_at: bool,

    /// Stamp `updated_at` on every insert and update.
    pub updated_at: bool,

    /// Name of the reserved collection used for lock entries.
    pub transaction_collection: String,

    /// How long a critical section may run before a warning is logged.
    /// The section is never aborted.
    pub transaction_warning_after: Duration,

    /// How often a lock waiter rescans the transaction collection.
    pub lock_poll_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            created_at: true,
            updated_at: true,
            transaction_collection: DEFAULT_TRANSACTION_COLLECTION.to_string(),
            transaction_warning_after: DEFAULT_WARNING_AFTER,
            lock_poll_interval: DEFAULT_LOCK_POLL_INTERVAL,
        }
    }
}

impl StoreConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether `created_at` is injected on insert.
    #[must_use]
    pub fn created_at(mut self, value: bool) -> Self {
        self.created_at = value;
        self
    }

    /// Set whether `updated_at` is injected on insert and update.
    #[must_use]
    pub fn updated_at(mut self, value: bool) -> Self {
        self.updated_at = value;
        self
    }

    /// Set the reserved transaction collection name.
    #[must_use]
    pub fn transaction_collection(mut self, name: impl Into<String>) -> Self {
        self.transaction_collection = name.into();
        self
    }

    /// Set the slow-critical-section warning threshold.
    #[must_use]
    pub fn transaction_warning_after(mut self, after: Duration) -> Self {
        self.transaction_warning_after = after;
        self
    }

    /// Set the lock waiter rescan cadence.
    #[must_use]
    pub fn lock_poll_interval(mut self, interval: Duration) -> Self {
        self.lock_poll_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert!(config.created_at);
        assert!(config.updated_at);
        assert_eq!(config.transaction_collection, "_transactions");
        assert_eq!(config.transaction_warning_after, Duration::from_secs(2));
        assert_eq!(config.lock_poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_builder() {
        let config = StoreConfig::new()
            .created_at(false)
            .updated_at(false)
            .transaction_collection("_locks")
            .transaction_warning_after(Duration::from_millis(500))
            .lock_poll_interval(Duration::from_millis(10));

        assert!(!config.created_at);
        assert!(!config.updated_at);
        assert_eq!(config.transaction_collection, "_locks");
        assert_eq!(
            config.transaction_warning_after,
            Duration::from_millis(500)
        );
        assert_eq!(config.lock_poll_interval, Duration::from_millis(10));
    }

    #[test]
    fn test_serialization() {
        let config = StoreConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: StoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(
            deserialized.transaction_collection,
            config.transaction_collection
        );
        assert_eq!(deserialized.created_at, config.created_at);
    }
}

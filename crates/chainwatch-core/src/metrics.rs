//! Counters kept by the watcher.

use serde::{Deserialize, Serialize};

/// Metrics snapshot for a watcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherMetrics {
    pub cycles_completed: u64,
    pub cycles_skipped: u64,
    /// Events handed to a subscribed handler (successfully or not).
    pub events_dispatched: u64,
    pub handler_errors: u64,
    pub ledger_errors: u64,
}

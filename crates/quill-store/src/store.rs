//! The store contract shared by every backend.

use async_trait::async_trait;
use quill_core::QuillResult;
use std::sync::Arc;
use std::time::Duration;

/// One sliding-window evaluation.
///
/// Scores are integer epoch milliseconds. Events with a score at or below
/// `now_ms - window_ms` are outside the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRequest {
    /// Window key, already namespaced.
    pub key: String,
    /// Current instant in epoch milliseconds.
    pub now_ms: i64,
    /// Window length in milliseconds.
    pub window_ms: i64,
    /// Events admitted per window.
    pub max_events: u32,
    /// Unique member recorded for this event.
    pub member: String,
}

impl WindowRequest {
    /// Scores at or below this value are pruned.
    #[must_use]
    pub const fn cutoff_ms(&self) -> i64 {
        self.now_ms - self.window_ms
    }
}

/// Result of an atomic prune, count and conditional record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOutcome {
    /// Whether the event was recorded.
    pub admitted: bool,
    /// Events in the window before this one was considered.
    pub count: u64,
    /// Score of the oldest event still in the window, after recording.
    pub oldest_ms: Option<i64>,
}

/// Read-only view of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowSnapshot {
    /// Events currently in the window.
    pub count: u64,
    /// Score of the oldest event in the window.
    pub oldest_ms: Option<i64>,
}

/// Key-value store holding cache entries and rate-limit windows.
///
/// Every method fails with `QuillError::StoreUnavailable` when the backend
/// cannot be reached or a call exceeds its time bound.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Short name used in logs and health output.
    fn backend_name(&self) -> &'static str;

    /// Checks that the backend answers.
    async fn ping(&self) -> QuillResult<()>;

    /// Returns the value stored at `key`, if present and not expired.
    async fn get(&self, key: &str) -> QuillResult<Option<String>>;

    /// Stores `value` at `key` for `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> QuillResult<()>;

    /// Removes `key`. Returns whether it existed.
    async fn delete(&self, key: &str) -> QuillResult<bool>;

    /// Removes every key matching a glob pattern. Returns how many were removed.
    async fn delete_pattern(&self, pattern: &str) -> QuillResult<u64>;

    /// Atomically prunes the window, counts it and records the event when
    /// the count is below `max_events`.
    async fn record_event(&self, request: &WindowRequest) -> QuillResult<WindowOutcome>;

    /// Counts the events newer than `cutoff_ms` without modifying the window.
    async fn window_snapshot(&self, key: &str, cutoff_ms: i64) -> QuillResult<WindowSnapshot>;
}

/// Shared handle to a store.
pub type SharedStore = Arc<dyn KeyValueStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cutoff() {
        let request = WindowRequest {
            key: "rl:ip:1.2.3.4:login".to_string(),
            now_ms: 120_000,
            window_ms: 60_000,
            max_events: 5,
            member: "m".to_string(),
        };
        assert_eq!(request.cutoff_ms(), 60_000);
    }
}

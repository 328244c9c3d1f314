//! In-process store with the same contract as Redis.
//!
//! A single mutex guards the whole keyspace, so the window prune, count and
//! record sequence is atomic exactly as the Lua script is on Redis.

use crate::pattern;
use crate::store::{KeyValueStore, WindowOutcome, WindowRequest, WindowSnapshot};
use crate::StoreError;
use async_trait::async_trait;
use parking_lot::Mutex;
use quill_core::{duration_millis, QuillError, QuillResult, SharedClock, SystemClock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Minimum clock time between two sweeps of expired slots.
const SWEEP_INTERVAL_MS: i64 = 60_000;

#[derive(Debug, Clone)]
enum Slot {
    Value { value: String, expires_at: i64 },
    /// Events sorted by score.
    Window { events: Vec<(i64, String)>, expires_at: i64 },
}

impl Slot {
    const fn expires_at(&self) -> i64 {
        match self {
            Self::Value { expires_at, .. } | Self::Window { expires_at, .. } => *expires_at,
        }
    }

    const fn is_live(&self, now_ms: i64) -> bool {
        self.expires_at() > now_ms
    }
}

/// In-memory key-value store.
///
/// Time comes from the injected clock, so expiry follows a `ManualClock` in
/// tests. [`MemoryStore::set_available`] simulates an outage.
///
/// Expired slots are dropped when read, and every write sweeps the whole
/// keyspace once at least a minute has passed since the previous sweep, so
/// abandoned windows and entries do not accumulate.
pub struct MemoryStore {
    clock: SharedClock,
    slots: Mutex<HashMap<String, Slot>>,
    last_sweep_ms: AtomicI64,
    available: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store on the given clock.
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        let now = clock.now_millis();
        Self {
            clock,
            slots: Mutex::new(HashMap::new()),
            last_sweep_ms: AtomicI64::new(now),
            available: AtomicBool::new(true),
        }
    }

    /// Creates an empty store on the system clock.
    #[must_use]
    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    /// Switches the simulated outage on or off.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = self.clock.now_millis();
        self.slots.lock().values().filter(|slot| slot.is_live(now)).count()
    }

    /// Returns true when no live keys remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted list of live keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let now = self.clock.now_millis();
        let mut keys: Vec<String> = self
            .slots
            .lock()
            .iter()
            .filter(|(_, slot)| slot.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Drops every expired slot. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut slots = self.slots.lock();
        self.sweep(&mut slots, now)
    }

    fn sweep(&self, slots: &mut HashMap<String, Slot>, now: i64) -> usize {
        let before = slots.len();
        slots.retain(|_, slot| slot.is_live(now));
        self.last_sweep_ms.store(now, Ordering::Relaxed);

        let removed = before - slots.len();
        if removed > 0 {
            debug!(removed, remaining = slots.len(), "Swept expired keys");
        }
        removed
    }

    fn sweep_if_due(&self, slots: &mut HashMap<String, Slot>, now: i64) {
        if now.saturating_sub(self.last_sweep_ms.load(Ordering::Relaxed)) >= SWEEP_INTERVAL_MS {
            self.sweep(slots, now);
        }
    }

    fn ensure_available(&self) -> QuillResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Offline.into())
        }
    }

    fn wrong_type(key: &str) -> QuillError {
        StoreError::Protocol(format!(
            "WRONGTYPE key '{}' holds the wrong kind of value",
            key
        ))
        .into()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_system_clock()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> QuillResult<()> {
        self.ensure_available()
    }

    async fn get(&self, key: &str) -> QuillResult<Option<String>> {
        self.ensure_available()?;
        let now = self.clock.now_millis();
        let mut slots = self.slots.lock();

        if slots.get(key).is_some_and(|slot| !slot.is_live(now)) {
            slots.remove(key);
        }

        match slots.get(key) {
            Some(Slot::Value { value, .. }) => Ok(Some(value.clone())),
            Some(Slot::Window { .. }) => Err(Self::wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> QuillResult<()> {
        self.ensure_available()?;
        let ttl_ms = duration_millis(ttl);
        if ttl_ms <= 0 {
            return Err(QuillError::invalid_configuration(format!(
                "TTL for '{}' must be at least one millisecond",
                key
            )));
        }

        let now = self.clock.now_millis();
        let mut slots = self.slots.lock();
        self.sweep_if_due(&mut slots, now);
        slots.insert(
            key.to_string(),
            Slot::Value {
                value: value.to_string(),
                expires_at: now.saturating_add(ttl_ms),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> QuillResult<bool> {
        self.ensure_available()?;
        let now = self.clock.now_millis();
        Ok(self.slots.lock().remove(key).is_some_and(|slot| slot.is_live(now)))
    }

    async fn delete_pattern(&self, pattern: &str) -> QuillResult<u64> {
        self.ensure_available()?;
        let now = self.clock.now_millis();
        let mut slots = self.slots.lock();

        let mut deleted = 0u64;
        slots.retain(|key, slot| {
            if !pattern::matches(pattern, key) {
                return true;
            }
            if slot.is_live(now) {
                deleted += 1;
            }
            false
        });

        debug!(pattern = %pattern, deleted, "Deleted keys by pattern");
        Ok(deleted)
    }

    async fn record_event(&self, request: &WindowRequest) -> QuillResult<WindowOutcome> {
        self.ensure_available()?;
        let now = self.clock.now_millis();
        let cutoff = request.cutoff_ms();
        let mut slots = self.slots.lock();
        self.sweep_if_due(&mut slots, now);

        if slots.get(&request.key).is_some_and(|slot| !slot.is_live(now)) {
            slots.remove(&request.key);
        }

        let slot = slots.entry(request.key.clone()).or_insert_with(|| Slot::Window {
            events: Vec::new(),
            expires_at: i64::MAX,
        });
        let Slot::Window { events, expires_at } = slot else {
            return Err(Self::wrong_type(&request.key));
        };

        events.retain(|(score, _)| *score > cutoff);
        let count = events.len() as u64;
        let admitted = count < u64::from(request.max_events);

        if admitted {
            let at = events.partition_point(|(score, _)| *score <= request.now_ms);
            events.insert(at, (request.now_ms, request.member.clone()));
            *expires_at = now.saturating_add(request.window_ms);
        }

        let oldest_ms = events.first().map(|(score, _)| *score);
        if events.is_empty() {
            slots.remove(&request.key);
        }

        Ok(WindowOutcome {
            admitted,
            count,
            oldest_ms,
        })
    }

    async fn window_snapshot(&self, key: &str, cutoff_ms: i64) -> QuillResult<WindowSnapshot> {
        self.ensure_available()?;
        let now = self.clock.now_millis();
        let slots = self.slots.lock();

        match slots.get(key) {
            Some(Slot::Window { events, expires_at }) if *expires_at > now => {
                let mut live = events.iter().filter(|(score, _)| *score > cutoff_ms);
                let oldest_ms = live.next().map(|(score, _)| *score);
                let count = oldest_ms.map_or(0, |_| 1 + live.count() as u64);
                Ok(WindowSnapshot { count, oldest_ms })
            }
            Some(Slot::Value { expires_at, .. }) if *expires_at > now => Err(Self::wrong_type(key)),
            _ => Ok(WindowSnapshot::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::{Clock, ManualClock};

    fn store_at(millis: i64) -> (Arc<ManualClock>, MemoryStore) {
        let clock = Arc::new(ManualClock::at_millis(millis));
        let store = MemoryStore::new(clock.clone());
        (clock, store)
    }

    fn request(key: &str, now_ms: i64, max_events: u32) -> WindowRequest {
        WindowRequest {
            key: key.to_string(),
            now_ms,
            window_ms: 10_000,
            max_events,
            member: format!("{}-m", now_ms),
        }
    }

    #[tokio::test]
    async fn test_set_get_expire() {
        let (clock, store) = store_at(1_000);
        store.set("user:1", "alice", Duration::from_secs(5)).await.unwrap();
        assert_eq!(store.get("user:1").await.unwrap(), Some("alice".to_string()));

        clock.advance(Duration::from_secs(5));
        assert_eq!(store.get("user:1").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_zero_ttl_rejected() {
        let (_, store) = store_at(0);
        let err = store.set("k", "v", Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, QuillError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn test_delete_and_delete_pattern() {
        let (_, store) = store_at(0);
        for key in ["posts:page:1", "posts:page:2", "user:42"] {
            store.set(key, "x", Duration::from_secs(60)).await.unwrap();
        }

        assert_eq!(store.delete_pattern("posts:*").await.unwrap(), 2);
        assert_eq!(store.keys(), vec!["user:42".to_string()]);
        assert!(store.delete("user:42").await.unwrap());
        assert!(!store.delete("user:42").await.unwrap());
    }

    #[tokio::test]
    async fn test_window_prunes_and_counts() {
        let (_, store) = store_at(0);

        let first = store.record_event(&request("w", 1_000, 2)).await.unwrap();
        assert!(first.admitted);
        assert_eq!(first.count, 0);
        assert_eq!(first.oldest_ms, Some(1_000));

        let second = store.record_event(&request("w", 2_000, 2)).await.unwrap();
        assert!(second.admitted);
        assert_eq!(second.count, 1);

        let third = store.record_event(&request("w", 3_000, 2)).await.unwrap();
        assert!(!third.admitted);
        assert_eq!(third.count, 2);
        assert_eq!(third.oldest_ms, Some(1_000));

        // exactly one window after the first event, it no longer counts
        let fourth = store.record_event(&request("w", 11_000, 2)).await.unwrap();
        assert!(fourth.admitted);
        assert_eq!(fourth.count, 1);
        assert_eq!(fourth.oldest_ms, Some(2_000));
    }

    #[tokio::test]
    async fn test_snapshot_does_not_modify() {
        let (_, store) = store_at(0);
        store.record_event(&request("w", 1_000, 5)).await.unwrap();
        store.record_event(&request("w", 4_000, 5)).await.unwrap();

        let snapshot = store.window_snapshot("w", 2_000).await.unwrap();
        assert_eq!(snapshot, WindowSnapshot { count: 1, oldest_ms: Some(4_000) });

        let snapshot = store.window_snapshot("w", 0).await.unwrap();
        assert_eq!(snapshot.count, 2);

        assert_eq!(store.window_snapshot("missing", 0).await.unwrap(), WindowSnapshot::default());
    }

    #[tokio::test]
    async fn test_outage_switch() {
        let (_, store) = store_at(0);
        store.set_available(false);

        assert!(store.ping().await.unwrap_err().is_store_failure());
        assert!(store.get("k").await.unwrap_err().is_store_failure());
        assert!(store.record_event(&request("w", 0, 1)).await.unwrap_err().is_store_failure());

        store.set_available(true);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_writes_sweep_expired_slots() {
        let (clock, store) = store_at(0);
        for i in 0..1_000 {
            store.record_event(&request(&format!("ip:{}:login", i), 0, 5)).await.unwrap();
            store.set(&format!("post:{}", i), "x", Duration::from_secs(30)).await.unwrap();
        }
        assert_eq!(store.slots.lock().len(), 2_000);

        clock.advance(Duration::from_secs(3_600));
        assert!(store.is_empty());
        assert_eq!(store.slots.lock().len(), 2_000);

        store.set("user:1", "alice", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.slots.lock().len(), 1);

        // within the sweep interval nothing is scanned
        store.set("short", "x", Duration::from_secs(1)).await.unwrap();
        clock.advance(Duration::from_secs(2));
        store.record_event(&request("w", clock.now_millis(), 5)).await.unwrap();
        assert_eq!(store.slots.lock().len(), 3);

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.keys(), vec!["user:1".to_string(), "w".to_string()]);
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let (_, store) = store_at(0);
        store.set("k", "v", Duration::from_secs(1)).await.unwrap();
        let err = store.record_event(&request("k", 0, 1)).await.unwrap_err();
        assert!(err.to_string().contains("WRONGTYPE"));
    }
}

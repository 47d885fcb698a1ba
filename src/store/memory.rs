//! Bounded in-process counter store.

use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{CounterRecord, CounterStore, StoreError};
use crate::clock::{system_clock, SharedClock};

/// Default maximum number of distinct keys.
const DEFAULT_MAX_SIZE: usize = 1000;
/// Default period of the background expiry sweep.
const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Why an entry left the store on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// Dropped as least recently used to make room for a new key
    Capacity,
    /// Found expired by a read or by the sweep
    Expired,
}

/// Diagnostic hooks for store activity.
///
/// Observers are called after the store's lock has been released and never
/// influence what the store returns.
pub trait StoreObserver: Send + Sync {
    fn on_get(&self, _key: &str, _record: Option<&CounterRecord>) {}

    fn on_set(&self, _key: &str, _record: &CounterRecord) {}

    fn on_evict(&self, _key: &str, _record: &CounterRecord, _reason: EvictionReason) {}
}

/// Construction options for [`MemoryStore`].
#[derive(Clone)]
pub struct MemoryStoreOptions {
    /// Maximum number of distinct keys held at once
    pub max_size: usize,
    /// Period of the background expiry sweep; `None` disables it
    pub cleanup_interval: Option<Duration>,
    /// Time source for expiry
    pub clock: SharedClock,
    /// Optional activity observer
    pub observer: Option<Arc<dyn StoreObserver>>,
}

impl Default for MemoryStoreOptions {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            cleanup_interval: Some(DEFAULT_CLEANUP_INTERVAL),
            clock: system_clock(),
            observer: None,
        }
    }
}

impl std::fmt::Debug for MemoryStoreOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStoreOptions")
            .field("max_size", &self.max_size)
            .field("cleanup_interval", &self.cleanup_interval)
            .field("clock", &self.clock)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// Point-in-time store statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStoreStats {
    /// Entries currently held, including expired ones not yet swept
    pub size: usize,
    pub max_size: usize,
    pub cleanup_interval: Option<Duration>,
}

enum Event {
    Get(String, Option<CounterRecord>),
    Set(String, CounterRecord),
    Evict(String, CounterRecord, EvictionReason),
}

struct Entries {
    /// Records ordered from most to least recently used
    records: LruCache<String, CounterRecord>,
}

impl Entries {
    fn with_capacity(max_size: usize) -> Self {
        let capacity = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            records: LruCache::new(capacity),
        }
    }

    fn touch(&mut self, key: &str) {
        self.records.promote(key);
    }

    fn remove(&mut self, key: &str) -> Option<CounterRecord> {
        self.records.pop(key)
    }

    /// Insert or replace a record, evicting the least recently used key when
    /// a new key would exceed the capacity.
    fn insert(&mut self, key: &str, record: CounterRecord, events: &mut Vec<Event>) {
        if let Some(existing) = self.records.get_mut(key) {
            *existing = record;
            return;
        }

        if let Some((victim, evicted)) = self.records.push(key.to_string(), record) {
            debug!(key = %victim, value = evicted.value, "Evicting least recently used counter");
            events.push(Event::Evict(victim, evicted, EvictionReason::Capacity));
        }
    }

    /// Value of a live record, purging it if it has expired.
    fn live_value(&mut self, key: &str, now: u64, events: &mut Vec<Event>) -> Option<u64> {
        let record = *self.records.peek(key)?;
        if record.is_expired(now) {
            self.remove(key);
            events.push(Event::Evict(key.to_string(), record, EvictionReason::Expired));
            return None;
        }
        Some(record.value)
    }
}

struct Shared {
    entries: Mutex<Entries>,
    max_size: usize,
    cleanup_interval: Option<Duration>,
    clock: SharedClock,
    observer: Option<Arc<dyn StoreObserver>>,
}

impl Shared {
    fn notify(&self, events: Vec<Event>) {
        let Some(observer) = &self.observer else {
            return;
        };
        for event in events {
            match event {
                Event::Get(key, record) => observer.on_get(&key, record.as_ref()),
                Event::Set(key, record) => observer.on_set(&key, &record),
                Event::Evict(key, record, reason) => observer.on_evict(&key, &record, reason),
            }
        }
    }

    fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        let mut events = Vec::new();
        {
            let mut entries = self.entries.lock();
            let expired: Vec<String> = entries
                .records
                .iter()
                .filter(|(_, record)| record.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect();
            for key in expired {
                if let Some(record) = entries.remove(&key) {
                    events.push(Event::Evict(key, record, EvictionReason::Expired));
                }
            }
        }
        let removed = events.len();
        self.notify(events);
        removed
    }

    /// Store `value` for `key`; a zero ttl behaves as an immediate delete.
    fn install(&self, entries: &mut Entries, key: &str, record: CounterRecord, ttl_ms: u64, events: &mut Vec<Event>) {
        if ttl_ms == 0 {
            entries.remove(key);
        } else {
            entries.insert(key, record, events);
        }
        events.push(Event::Set(key.to_string(), record));
    }
}

/// In-process store with least-recently-used eviction and lazy plus periodic
/// expiry.
///
/// Every read path re-checks expiry, so the background sweep only bounds how
/// long dead entries occupy capacity.
pub struct MemoryStore {
    shared: Arc<Shared>,
    sweeper: Option<JoinHandle<()>>,
}

impl MemoryStore {
    /// Create a store. The background sweep is spawned on the current tokio
    /// runtime, if there is one.
    pub fn new(options: MemoryStoreOptions) -> Self {
        let max_size = options.max_size.max(1);
        let shared = Arc::new(Shared {
            entries: Mutex::new(Entries::with_capacity(max_size)),
            max_size,
            cleanup_interval: options.cleanup_interval.filter(|d| !d.is_zero()),
            clock: options.clock,
            observer: options.observer,
        });

        let sweeper = shared
            .cleanup_interval
            .and_then(|period| spawn_sweeper(Arc::downgrade(&shared), period));

        info!(
            max_size = shared.max_size,
            cleanup_interval = ?shared.cleanup_interval,
            "Memory store created"
        );

        Self { shared, sweeper }
    }

    /// Whether a live record exists. Does not affect recency.
    pub fn has(&self, key: &str) -> bool {
        let now = self.shared.clock.now_millis();
        let entries = self.shared.entries.lock();
        entries
            .records
            .peek(key)
            .is_some_and(|record| !record.is_expired(now))
    }

    /// Remove a key. Returns `true` if a live record was removed.
    pub fn delete(&self, key: &str) -> bool {
        let now = self.shared.clock.now_millis();
        let mut entries = self.shared.entries.lock();
        entries
            .remove(key)
            .is_some_and(|record| !record.is_expired(now))
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let mut entries = self.shared.entries.lock();
        entries.records.clear();
    }

    /// Live keys, least recently used first.
    pub fn keys(&self) -> Vec<String> {
        let now = self.shared.clock.now_millis();
        let entries = self.shared.entries.lock();
        entries
            .records
            .iter()
            .rev()
            .filter(|(_, record)| !record.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Number of entries held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.shared.entries.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all expired entries now. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        self.shared.sweep()
    }

    pub fn stats(&self) -> MemoryStoreStats {
        MemoryStoreStats {
            size: self.len(),
            max_size: self.shared.max_size,
            cleanup_interval: self.shared.cleanup_interval,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(MemoryStoreOptions::default())
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("stats", &self.stats())
            .field("sweeping", &self.sweeper.is_some())
            .finish()
    }
}

fn spawn_sweeper(shared: Weak<Shared>, period: Duration) -> Option<JoinHandle<()>> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!("No tokio runtime available, memory store expiry sweep disabled");
        return None;
    };

    Some(runtime.spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(shared) = shared.upgrade() else {
                break;
            };
            let removed = shared.sweep();
            if removed > 0 {
                debug!(removed, "Swept expired counters");
            }
        }
    }))
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let now = self.shared.clock.now_millis();
        let mut events = Vec::new();
        let value = {
            let mut entries = self.shared.entries.lock();
            let value = entries.live_value(key, now, &mut events);
            if value.is_some() {
                entries.touch(key);
            }
            events.push(Event::Get(key.to_string(), entries.records.peek(key).copied()));
            value
        };
        self.shared.notify(events);
        Ok(value)
    }

    async fn set(&self, key: &str, value: u64, ttl_ms: u64) -> Result<(), StoreError> {
        let now = self.shared.clock.now_millis();
        let record = CounterRecord::new(value, now, ttl_ms);
        let mut events = Vec::new();
        {
            let mut entries = self.shared.entries.lock();
            self.shared.install(&mut entries, key, record, ttl_ms, &mut events);
        }
        self.shared.notify(events);
        Ok(())
    }

    async fn increment(&self, key: &str, ttl_ms: u64) -> Result<u64, StoreError> {
        let now = self.shared.clock.now_millis();
        let mut events = Vec::new();
        let value = {
            let mut entries = self.shared.entries.lock();
            let value = entries.live_value(key, now, &mut events).unwrap_or(0) + 1;
            let record = CounterRecord::new(value, now, ttl_ms);
            self.shared.install(&mut entries, key, record, ttl_ms, &mut events);
            value
        };
        self.shared.notify(events);
        Ok(value)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

//! In-process cache for single-instance deployments.
//!
//! Built on two `moka` caches with per-entry expiry:
//!
//! - **records**: values written with `set`/`set_nx` (link records, reverse
//!   lookups, aggregates, flush markers and locks). Bounded by
//!   `max_capacity`, so cold records are evicted under pressure.
//! - **counters**: values written with `increment_by` and sets (pending
//!   counters, the dirty set, the slug pool). Not size-bounded: evicting one
//!   would lose clicks. Counters still expire by TTL.
//!
//! Expired entries in both are purged by moka's housekeeping whether or not
//! the key is touched again.

use super::service::{CacheError, CacheResult, CacheService};
use async_trait::async_trait;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use moka::policy::Expiry;
use std::collections::HashSet;
use std::future::ready;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default bound on cached records (`MEMORY_CACHE_MAX_CAPACITY`).
pub const DEFAULT_MAX_CAPACITY: u64 = 100_000;

/// Expiry requested by a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ttl {
    /// Expire after this long; `None` never expires.
    Set(Option<Duration>),
    /// Keep whatever expiry the entry already had.
    Keep,
}

impl Ttl {
    fn seconds(ttl_seconds: Option<u64>) -> Self {
        Ttl::Set(ttl_seconds.map(Duration::from_secs))
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Text(String),
    Set(Arc<HashSet<String>>),
}

#[derive(Debug, Clone)]
struct Entry {
    slot: Slot,
    ttl: Ttl,
}

impl Entry {
    fn text(value: impl Into<String>, ttl: Ttl) -> Self {
        Self {
            slot: Slot::Text(value.into()),
            ttl,
        }
    }

    fn set(members: HashSet<String>) -> Self {
        Self {
            slot: Slot::Set(Arc::new(members)),
            ttl: Ttl::Keep,
        }
    }
}

/// Applies the TTL carried by each write.
struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        match value.ttl {
            Ttl::Set(ttl) => ttl,
            Ttl::Keep => None,
        }
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        match value.ttl {
            Ttl::Set(ttl) => ttl,
            Ttl::Keep => duration_until_expiry,
        }
    }
}

/// Cache held in process memory.
///
/// Read-modify-write operations go through `and_compute_with`, which is
/// atomic per key, so concurrent increments and pops never lose updates.
pub struct MemoryCache {
    records: Cache<String, Entry>,
    counters: Cache<String, Entry>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_CAPACITY)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache holding at most `max_capacity` records.
    pub fn with_capacity(max_capacity: u64) -> Self {
        let records = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryExpiry)
            .build();
        let counters = Cache::builder().expire_after(EntryExpiry).build();

        tracing::debug!("MemoryCache initialized with max capacity: {}", max_capacity);
        Self { records, counters }
    }

    /// Live entries after pending evictions and expirations have run.
    pub async fn entry_count(&self) -> u64 {
        self.records.run_pending_tasks().await;
        self.counters.run_pending_tasks().await;
        self.records.entry_count() + self.counters.entry_count()
    }

    /// Reads a text record as an integer, the way INCRBY would, and drops it
    /// so the counter slot takes over.
    async fn take_record_integer(&self, key: &str) -> CacheResult<Option<i64>> {
        let Some(entry) = self.records.get(key).await else {
            return Ok(None);
        };
        let value = integer(key, &entry)?;
        self.records.invalidate(key).await;
        Ok(Some(value))
    }
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::OperationError(format!("WRONGTYPE operation against key {}", key))
}

fn integer(key: &str, entry: &Entry) -> CacheResult<i64> {
    match &entry.slot {
        Slot::Text(raw) => raw.parse().map_err(|_| {
            CacheError::OperationError(format!("value at {} is not an integer", key))
        }),
        Slot::Set(_) => Err(wrong_type(key)),
    }
}

/// Re-arms the expiry of an existing entry. Returns `false` if absent.
async fn rearm(cache: &Cache<String, Entry>, key: &str, ttl: Duration) -> bool {
    let result = cache
        .entry(key.to_string())
        .and_compute_with(|existing| {
            ready(match existing {
                Some(entry) => Op::Put(Entry {
                    ttl: Ttl::Set(Some(ttl)),
                    ..entry.into_value()
                }),
                None => Op::Nop,
            })
        })
        .await;
    matches!(result, CompResult::ReplacedWith(_))
}

#[async_trait]
impl CacheService for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        if let Some(entry) = self.records.get(key).await {
            return match entry.slot {
                Slot::Text(value) => Ok(Some(value)),
                Slot::Set(_) => Err(wrong_type(key)),
            };
        }
        match self.counters.get(key).await {
            Some(Entry {
                slot: Slot::Text(value),
                ..
            }) => Ok(Some(value)),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> CacheResult<()> {
        self.counters.invalidate(key).await;
        self.records
            .insert(key.to_string(), Entry::text(value, Ttl::seconds(ttl_seconds)))
            .await;
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl_seconds: u64) -> CacheResult<bool> {
        if self.counters.get(key).await.is_some() {
            return Ok(false);
        }

        let entry = Entry::text(value, Ttl::seconds(Some(ttl_seconds)));
        let result = self
            .records
            .entry(key.to_string())
            .and_compute_with(|existing| {
                ready(match existing {
                    Some(_) => Op::Nop,
                    None => Op::Put(entry),
                })
            })
            .await;
        Ok(matches!(result, CompResult::Inserted(_)))
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        let mut removed = 0;
        for key in keys {
            let record = self.records.remove(key).await.is_some();
            let counter = self.counters.remove(key).await.is_some();
            if record || counter {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.records.get(key).await.is_some() || self.counters.get(key).await.is_some())
    }

    async fn increment_by(&self, key: &str, delta: i64) -> CacheResult<i64> {
        let seed = self.take_record_integer(key).await?.unwrap_or(0);

        let mut outcome = Ok(0);
        self.counters
            .entry(key.to_string())
            .and_compute_with(|existing| {
                let op = match existing {
                    None => {
                        let next = seed + delta;
                        outcome = Ok(next);
                        Op::Put(Entry::text(next.to_string(), Ttl::Set(None)))
                    }
                    Some(entry) => match integer(key, entry.value()) {
                        Ok(current) => {
                            let next = current + delta;
                            outcome = Ok(next);
                            Op::Put(Entry::text(next.to_string(), Ttl::Keep))
                        }
                        Err(e) => {
                            outcome = Err(e);
                            Op::Nop
                        }
                    },
                };
                ready(op)
            })
            .await;
        outcome
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> CacheResult<bool> {
        let ttl = Duration::from_secs(ttl_seconds);
        let record = rearm(&self.records, key, ttl).await;
        let counter = rearm(&self.counters, key, ttl).await;
        Ok(record || counter)
    }

    async fn set_add(&self, key: &str, members: &[String]) -> CacheResult<u64> {
        if self.records.get(key).await.is_some() {
            return Err(wrong_type(key));
        }

        let mut outcome = Ok(0);
        self.counters
            .entry(key.to_string())
            .and_compute_with(|existing| {
                let mut set = match existing.map(|e| e.into_value().slot) {
                    None => HashSet::new(),
                    Some(Slot::Set(set)) => Arc::unwrap_or_clone(set),
                    Some(Slot::Text(_)) => {
                        outcome = Err(wrong_type(key));
                        return ready(Op::Nop);
                    }
                };
                let added = members.iter().filter(|m| set.insert((*m).clone())).count();
                outcome = Ok(added as u64);
                if set.is_empty() {
                    return ready(Op::Nop);
                }
                ready(Op::Put(Entry::set(set)))
            })
            .await;
        outcome
    }

    async fn set_pop(&self, key: &str) -> CacheResult<Option<String>> {
        let mut outcome = Ok(None);
        self.counters
            .entry(key.to_string())
            .and_compute_with(|existing| {
                let op = match existing.map(|e| e.into_value().slot) {
                    None => Op::Nop,
                    Some(Slot::Text(_)) => {
                        outcome = Err(wrong_type(key));
                        Op::Nop
                    }
                    Some(Slot::Set(set)) => {
                        let mut set = Arc::unwrap_or_clone(set);
                        let member = set.iter().next().cloned();
                        if let Some(ref m) = member {
                            set.remove(m);
                        }
                        outcome = Ok(member);
                        if set.is_empty() {
                            Op::Remove
                        } else {
                            Op::Put(Entry::set(set))
                        }
                    }
                };
                ready(op)
            })
            .await;
        outcome
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> CacheResult<u64> {
        let mut outcome = Ok(0);
        self.counters
            .entry(key.to_string())
            .and_compute_with(|existing| {
                let op = match existing.map(|e| e.into_value().slot) {
                    None => Op::Nop,
                    Some(Slot::Text(_)) => {
                        outcome = Err(wrong_type(key));
                        Op::Nop
                    }
                    Some(Slot::Set(set)) => {
                        let mut set = Arc::unwrap_or_clone(set);
                        let removed = members.iter().filter(|m| set.remove(*m)).count();
                        outcome = Ok(removed as u64);
                        if removed == 0 {
                            Op::Nop
                        } else if set.is_empty() {
                            Op::Remove
                        } else {
                            Op::Put(Entry::set(set))
                        }
                    }
                };
                ready(op)
            })
            .await;
        outcome
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        match self.counters.get(key).await.map(|e| e.slot) {
            Some(Slot::Set(set)) => Ok(set.iter().cloned().collect()),
            Some(Slot::Text(_)) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn set_len(&self, key: &str) -> CacheResult<u64> {
        match self.counters.get(key).await.map(|e| e.slot) {
            Some(Slot::Set(set)) => Ok(set.len() as u64),
            Some(Slot::Text(_)) => Err(wrong_type(key)),
            None => Ok(0),
        }
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    FixedWindowStore, RatewatchError, StoreOptions,
    backend::{Backend, Transaction, Ttl},
};

/// Fixed-window store hosted in process memory.
pub type MemoryCounterStore = FixedWindowStore<MemoryBackend>;

impl MemoryCounterStore {
    /// Create a store over a fresh [`MemoryBackend`].
    pub fn in_memory(options: StoreOptions) -> Self {
        FixedWindowStore::new(MemoryBackend::new(), options)
    }
}

/// Expiry instant for `ttl`, `None` when it lies beyond the clock's range.
fn deadline(now: Instant, ttl: Duration) -> Option<Instant> {
    now.checked_add(ttl)
}

#[derive(Debug)]
struct Counter {
    count: u64,
    expires_at: Option<Instant>,
    version: u64,
}

impl Counter {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    fn ttl(&self, now: Instant) -> Ttl {
        match self.expires_at {
            Some(at) => Ttl::Expires(at.saturating_duration_since(now)),
            None => Ttl::Persistent,
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    counters: DashMap<String, Counter>,
    versions: AtomicU64,
}

impl Shared {
    fn next_version(&self) -> u64 {
        self.versions.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Version of the live counter under `key`, `None` when absent or expired.
    fn live_version(&self, key: &str, now: Instant) -> Option<u64> {
        self.counters
            .get(key)
            .filter(|counter| counter.is_live(now))
            .map(|counter| counter.version)
    }
}

/// In-process [`Backend`] with the same watch semantics as Redis.
///
/// Every write stamps the counter with a new version. A transaction remembers
/// the version it watched and refuses to commit once it changed, including when
/// the key expired or was recreated in between. Expired counters read as absent
/// and are only dropped by [`purge_expired`](Self::purge_expired) or when
/// overwritten.
///
/// State lives only in this process: use it for single-instance deployments and
/// tests, and a shared store such as Redis when several processes must agree.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live counters.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.shared
            .counters
            .iter()
            .filter(|counter| counter.is_live(now))
            .count()
    }

    /// Whether no live counter exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired counter.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.shared.counters.retain(|_, counter| counter.is_live(now));
    }

    /// Store a raw counter, bypassing the window protocol.
    pub(crate) fn insert_raw(&self, key: &str, count: u64, ttl: Option<Duration>) {
        let version = self.shared.next_version();
        self.shared.counters.insert(
            key.to_string(),
            Counter {
                count,
                expires_at: ttl.and_then(|ttl| deadline(Instant::now(), ttl)),
                version,
            },
        );
    }

    /// Raw count stored under a fully prefixed key.
    pub(crate) fn raw_count(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        self.shared
            .counters
            .get(key)
            .filter(|counter| counter.is_live(now))
            .map(|counter| counter.count)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    type Transaction = MemoryTransaction;

    async fn watch(&self, key: &str) -> Result<Self::Transaction, RatewatchError> {
        let watched = self.shared.live_version(key, Instant::now());

        Ok(MemoryTransaction {
            shared: self.shared.clone(),
            key: key.to_string(),
            watched,
        })
    }
}

/// Transaction over a [`MemoryBackend`] key.
#[derive(Debug)]
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    key: String,
    watched: Option<u64>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn create_if_absent(&mut self, ttl: Duration) -> Result<bool, RatewatchError> {
        let now = Instant::now();
        let fresh = Counter {
            count: 1,
            expires_at: deadline(now, ttl),
            version: self.shared.next_version(),
        };

        match self.shared.counters.entry(self.key.clone()) {
            Entry::Occupied(occupied) if occupied.get().is_live(now) => Ok(false),
            Entry::Occupied(mut occupied) => {
                occupied.insert(fresh);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn increment(&mut self) -> Result<Option<(u64, Ttl)>, RatewatchError> {
        let now = Instant::now();

        match self.shared.counters.entry(self.key.clone()) {
            Entry::Occupied(mut occupied) => {
                let counter = occupied.get_mut();
                let current = counter.is_live(now).then_some(counter.version);

                if current != self.watched {
                    return Ok(None);
                }

                if current.is_none() {
                    // INCR on an expired key starts over with no expiry.
                    counter.count = 0;
                    counter.expires_at = None;
                }

                counter.count += 1;
                counter.version = self.shared.next_version();

                Ok(Some((counter.count, counter.ttl(now))))
            }
            Entry::Vacant(vacant) => {
                if self.watched.is_some() {
                    return Ok(None);
                }

                vacant.insert(Counter {
                    count: 1,
                    expires_at: None,
                    version: self.shared.next_version(),
                });

                Ok(Some((1, Ttl::Persistent)))
            }
        }
    }

    async fn read(&mut self) -> Result<Option<(u64, Ttl)>, RatewatchError> {
        let now = Instant::now();

        let (current, snapshot) = match self.shared.counters.get(&self.key) {
            Some(counter) if counter.is_live(now) => {
                (Some(counter.version), (counter.count, counter.ttl(now)))
            }
            _ => (None, (0, Ttl::Missing)),
        };

        if current != self.watched {
            return Ok(None);
        }

        Ok(Some(snapshot))
    }

    async fn expire(&mut self, ttl: Duration) -> Result<bool, RatewatchError> {
        let now = Instant::now();

        match self.shared.counters.get_mut(&self.key) {
            Some(mut counter) if counter.is_live(now) => {
                counter.expires_at = deadline(now, ttl);
                counter.version = self.shared.next_version();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn finish(self) -> Result<(), RatewatchError> {
        Ok(())
    }
}

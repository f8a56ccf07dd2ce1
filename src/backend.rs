//! Primitives a backing store must offer to host fixed-window counters.
//!
//! A [`Backend`] opens a [`Transaction`] that watches a single key. Writes made
//! through [`Transaction::increment`] are committed only if nobody touched the
//! watched key since [`Backend::watch`]; otherwise the commit is dropped and the
//! caller sees `Ok(None)`.

use std::time::Duration;

use async_trait::async_trait;

use crate::RatewatchError;

/// Remaining lifetime of a key as reported by the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// The key expires after this duration.
    Expires(Duration),
    /// The key exists but carries no expiry.
    Persistent,
    /// The key does not exist.
    Missing,
}

impl Ttl {
    /// Map a Redis `PTTL` reply onto a [`Ttl`].
    ///
    /// `-1` means the key has no expiry and `-2` that it does not exist.
    pub fn from_pttl_millis(millis: i64) -> Self {
        match millis {
            -1 => Self::Persistent,
            ms if ms < 0 => Self::Missing,
            ms => Self::Expires(Duration::from_millis(ms as u64)),
        }
    }
}

/// A shared key-value store with TTLs and optimistic watch.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Transaction handle scoped to one watched key.
    type Transaction: Transaction;

    /// Start watching `key` and return a transaction bound to it.
    async fn watch(&self, key: &str) -> Result<Self::Transaction, RatewatchError>;
}

/// Operations available while a key is watched.
#[async_trait]
pub trait Transaction: Send {
    /// Set the key to 1 with `ttl`, only if it is absent. Returns `true` when created.
    async fn create_if_absent(&mut self, ttl: Duration) -> Result<bool, RatewatchError>;

    /// Increment the key and read its TTL as one committed unit.
    ///
    /// `Ok(None)` means the watched key was changed concurrently and nothing was written.
    async fn increment(&mut self) -> Result<Option<(u64, Ttl)>, RatewatchError>;

    /// Read the count (0 when absent) and TTL as one unit.
    ///
    /// `Ok(None)` means the watched key was changed concurrently.
    async fn read(&mut self) -> Result<Option<(u64, Ttl)>, RatewatchError>;

    /// Set the key to expire after `ttl`. Returns `false` when the store refused.
    async fn expire(&mut self, ttl: Duration) -> Result<bool, RatewatchError>;

    /// Release the watch.
    async fn finish(self) -> Result<(), RatewatchError>
    where
        Self: Sized;
}

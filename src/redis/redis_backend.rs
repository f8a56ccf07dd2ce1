use std::time::Duration;

use async_trait::async_trait;
use futures::lock::OwnedMutexGuard;

use crate::{
    FixedWindowStore, RatewatchError, RatewatchRedisClient, StoreOptions,
    backend::{Backend, Transaction, Ttl},
    redis::common::Slot,
};

/// Fixed-window store backed by Redis.
pub type RedisCounterStore = FixedWindowStore<RedisBackend>;

impl RedisCounterStore {
    /// Create a store over a Redis connection pool.
    pub fn redis(client: RatewatchRedisClient, options: StoreOptions) -> Self {
        FixedWindowStore::new(RedisBackend::new(client), options)
    }
}

/// [`Backend`] on top of Redis WATCH / MULTI / EXEC.
///
/// | primitive | commands |
/// |---|---|
/// | watch | `WATCH key` |
/// | create if absent | `SET key 1 NX PX period` |
/// | increment | `MULTI`, `INCR key`, `PTTL key`, `EXEC` |
/// | read | `MULTI`, `GET key`, `PTTL key`, `EXEC` |
/// | expire | `PEXPIRE key period` |
/// | finish | `UNWATCH` |
///
/// An `EXEC` aborted by the watch replies nil, which surfaces as a conflict.
#[derive(Debug, Clone)]
pub struct RedisBackend {
    client: RatewatchRedisClient,
}

impl RedisBackend {
    /// Create a backend over a connection pool.
    pub fn new(client: RatewatchRedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Backend for RedisBackend {
    type Transaction = RedisTransaction;

    async fn watch(&self, key: &str) -> Result<Self::Transaction, RatewatchError> {
        let mut slot = self.client.lease().await;

        if slot.dirty {
            slot.reset().await;
        }

        slot.dirty = true;

        redis::cmd("WATCH")
            .arg(key)
            .query_async::<()>(&mut slot.connection)
            .await
            .map_err(|err| RatewatchError::unavailable(key, err))?;

        Ok(RedisTransaction {
            slot,
            key: key.to_string(),
        })
    }
}

/// Transaction over one watched Redis key.
pub struct RedisTransaction {
    slot: OwnedMutexGuard<Slot>,
    key: String,
}

/// `PX` / `PEXPIRE` argument: at least 1ms and at most `i64::MAX` ms.
///
/// Sub-millisecond remainders are truncated. A [`Rate`](crate::Rate) period is
/// always within range, so the clamp only matters for direct [`Transaction`]
/// callers.
fn as_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis())
        .unwrap_or(u64::MAX)
        .clamp(1, i64::MAX as u64)
}

#[async_trait]
impl Transaction for RedisTransaction {
    async fn create_if_absent(&mut self, ttl: Duration) -> Result<bool, RatewatchError> {
        let reply: Option<String> = redis::cmd("SET")
            .arg(&self.key)
            .arg(1)
            .arg("NX")
            .arg("PX")
            .arg(as_millis(ttl))
            .query_async(&mut self.slot.connection)
            .await
            .map_err(|err| RatewatchError::unavailable(&self.key, err))?;

        Ok(reply.is_some())
    }

    async fn increment(&mut self) -> Result<Option<(u64, Ttl)>, RatewatchError> {
        let reply: Option<(u64, i64)> = redis::pipe()
            .atomic()
            .incr(&self.key, 1)
            .pttl(&self.key)
            .query_async(&mut self.slot.connection)
            .await
            .map_err(|err| RatewatchError::unavailable(&self.key, err))?;

        Ok(reply.map(|(count, pttl)| (count, Ttl::from_pttl_millis(pttl))))
    }

    async fn read(&mut self) -> Result<Option<(u64, Ttl)>, RatewatchError> {
        let reply: Option<(Option<u64>, i64)> = redis::pipe()
            .atomic()
            .get(&self.key)
            .pttl(&self.key)
            .query_async(&mut self.slot.connection)
            .await
            .map_err(|err| RatewatchError::unavailable(&self.key, err))?;

        Ok(reply.map(|(count, pttl)| (count.unwrap_or(0), Ttl::from_pttl_millis(pttl))))
    }

    async fn expire(&mut self, ttl: Duration) -> Result<bool, RatewatchError> {
        redis::cmd("PEXPIRE")
            .arg(&self.key)
            .arg(as_millis(ttl))
            .query_async(&mut self.slot.connection)
            .await
            .map_err(|err| RatewatchError::unavailable(&self.key, err))
    }

    async fn finish(mut self) -> Result<(), RatewatchError> {
        redis::cmd("UNWATCH")
            .query_async::<()>(&mut self.slot.connection)
            .await
            .map_err(|err| RatewatchError::unavailable(&self.key, err))?;

        self.slot.dirty = false;

        Ok(())
    }
}

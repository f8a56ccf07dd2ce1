use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use futures::lock::{Mutex, OwnedMutexGuard};
use redis::{Client, aio::ConnectionManager};

use crate::RatewatchError;

/// A pooled Redis connection.
///
/// `dirty` is raised while a transaction is in flight and lowered once it
/// finishes cleanly. A transaction dropped halfway leaves it raised, and the
/// next lease clears any leftover WATCH or MULTI state first.
pub(crate) struct Slot {
    pub connection: ConnectionManager,
    pub dirty: bool,
}

impl Slot {
    pub(crate) async fn reset(&mut self) {
        // Fails with "DISCARD without MULTI" in the common case.
        let _: Result<(), _> = redis::cmd("DISCARD")
            .query_async(&mut self.connection)
            .await;

        match redis::cmd("UNWATCH")
            .query_async::<()>(&mut self.connection)
            .await
        {
            Ok(()) => self.dirty = false,
            Err(err) => tracing::error!(error = ?err, "failed to reset pooled redis connection"),
        }
    }
}

/// A fixed pool of [`redis::aio::ConnectionManager`]s.
///
/// WATCH state belongs to a connection, so each transaction leases one
/// connection for its whole duration instead of sharing a multiplexed socket
/// with concurrent callers.
pub struct RatewatchRedisClient {
    slots: Arc<Vec<Arc<Mutex<Slot>>>>,
    track_index: AtomicUsize,
}

impl RatewatchRedisClient {
    /// Create a pool holding a single connection.
    pub async fn default_from_client(client: Client) -> Result<Self, RatewatchError> {
        Self::from_client(client, 1).await
    }

    /// Create a pool of `connection_count` independent connections.
    pub async fn from_client(
        client: Client,
        connection_count: usize,
    ) -> Result<Self, RatewatchError> {
        if connection_count == 0 {
            return Err(RatewatchError::InvalidRedisClientConnectionCount(
                "connection count must be > 0".to_string(),
            ));
        }

        let mut slots = Vec::with_capacity(connection_count);

        for _ in 0..connection_count {
            slots.push(Arc::new(Mutex::new(Slot {
                connection: client.get_connection_manager().await?,
                dirty: false,
            })));
        }

        Ok(Self {
            slots: Arc::new(slots),
            track_index: AtomicUsize::new(0),
        })
    }

    /// Number of pooled connections.
    pub fn connection_count(&self) -> usize {
        self.slots.len()
    }

    /// Lease a connection, preferring an idle one.
    pub(crate) async fn lease(&self) -> OwnedMutexGuard<Slot> {
        let start = self.track_index.fetch_add(1, Ordering::Relaxed);
        let len = self.slots.len();

        for offset in 0..len {
            if let Some(slot) = self.slots[(start + offset) % len].try_lock_owned() {
                return slot;
            }
        }

        self.slots[start % len].clone().lock_owned().await
    } // end method lease
} // end impl RatewatchRedisClient

impl std::fmt::Debug for RatewatchRedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatewatchRedisClient")
            .field("connection_count", &self.slots.len())
            .finish()
    }
}

impl Clone for RatewatchRedisClient {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
            track_index: AtomicUsize::new(0),
        }
    }
}

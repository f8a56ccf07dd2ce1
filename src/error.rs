use std::time::Duration;

/// Boxed transport error carried by [`RatewatchError::BackingStoreUnavailable`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for this crate.
#[derive(Debug, thiserror::Error)]
pub enum RatewatchError {
    /// Every optimistic transaction attempt observed a concurrent write to the key.
    #[error("transaction conflict on `{key}` not resolved after {attempts} attempt(s)")]
    TransactionConflictExhausted {
        /// Fully prefixed store key.
        key: String,
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// The counter disappeared between the increment and the TTL read.
    ///
    /// Not retried: a key that keeps expiring under the transaction would loop.
    #[error("key `{key}` vanished while it was being incremented")]
    KeyVanished {
        /// Fully prefixed store key.
        key: String,
    },

    /// Transport or I/O failure talking to the backing store.
    #[error("backing store unavailable for `{key}`: {source}")]
    BackingStoreUnavailable {
        /// Fully prefixed store key.
        key: String,
        /// Underlying transport error.
        #[source]
        source: BoxError,
    },

    /// The backing store refused to restore the window TTL on a counter.
    #[error("failed to set expiry on `{key}`")]
    ExpirySetFailed {
        /// Fully prefixed store key.
        key: String,
    },

    /// The configured operation deadline elapsed.
    ///
    /// A commit may still have been applied server-side.
    #[error("operation on `{key}` timed out after {timeout:?}")]
    Timeout {
        /// Fully prefixed store key.
        key: String,
        /// Deadline that elapsed.
        timeout: Duration,
    },

    /// Rate configuration error.
    #[error("invalid rate: {0}")]
    InvalidRate(String),

    /// Retry limit configuration error.
    #[error("invalid retry limit: {0}")]
    InvalidRetryLimit(String),

    /// Key prefix configuration error.
    #[error("invalid key prefix: {0}")]
    InvalidKeyPrefix(String),

    /// Redis client connection count error.
    #[error("invalid redis client connection count: {0}")]
    InvalidRedisClientConnectionCount(String),

    /// Redis error.
    #[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
    #[error("redis error: {0}")]
    RedisError(#[from] redis::RedisError),
}

impl RatewatchError {
    pub(crate) fn unavailable(key: &str, source: impl Into<BoxError>) -> Self {
        Self::BackingStoreUnavailable {
            key: key.to_string(),
            source: source.into(),
        }
    }

    /// Returns `true` for failures a caller may reasonably retry later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransactionConflictExhausted { .. }
                | Self::BackingStoreUnavailable { .. }
                | Self::Timeout { .. }
        )
    }
}

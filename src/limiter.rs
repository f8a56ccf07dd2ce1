//! Top-level entrypoint binding a [`Rate`] to a [`CounterStore`].

use crate::{CounterStore, LimitRecord, Rate, RatewatchError};

/// Rate limiter facade.
///
/// Holds one [`Rate`] and one [`CounterStore`] and forwards identifier keys to
/// the store. Errors from the store are returned unchanged; deciding whether to
/// fail open or closed is left to the caller.
pub struct Limiter<S> {
    store: S,
    rate: Rate,
}

impl<S: CounterStore> Limiter<S> {
    /// Create a new [`Limiter`].
    pub fn new(store: S, rate: Rate) -> Self {
        Self { store, rate }
    }

    /// Count one request for `key` against the bound rate.
    pub async fn record_request(&self, key: &str) -> Result<LimitRecord, RatewatchError> {
        self.store.record_request(key, &self.rate).await
    }

    /// Peek at the current window for `key` without counting a request.
    pub async fn check_limit(&self, key: &str) -> Result<LimitRecord, RatewatchError> {
        self.store.check_limit(key, &self.rate).await
    }

    /// The bound rate.
    pub fn rate(&self) -> &Rate {
        &self.rate
    }

    /// Access the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

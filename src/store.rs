use std::{
    future::Future,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;

use crate::{
    KeyPrefix, LimitRecord, Rate, RatewatchError, RetryLimit,
    backend::{Backend, Transaction, Ttl},
    runtime,
};

/// Counter store contract consumed by [`Limiter`](crate::Limiter).
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Count one request for `key` and return the resulting record.
    async fn record_request(&self, key: &str, rate: &Rate) -> Result<LimitRecord, RatewatchError>;

    /// Return the record for `key` without counting a request.
    async fn check_limit(&self, key: &str, rate: &Rate) -> Result<LimitRecord, RatewatchError>;
}

/// Configuration for [`FixedWindowStore`].
#[derive(Clone, Debug, Default)]
pub struct StoreOptions {
    /// Namespace for every counter key: `<prefix>:<identifier>`.
    ///
    /// If `None`, defaults to `"ratewatch"`.
    pub prefix: Option<KeyPrefix>,

    /// Maximum optimistic transaction attempts per call.
    pub retry_limit: RetryLimit,

    /// Deadline for a whole call, retries included.
    ///
    /// Only enforced when a runtime feature (`redis-tokio` or `redis-smol`) is enabled.
    pub operation_timeout: Option<Duration>,

    /// Upper bound of a random pause between conflicting attempts.
    ///
    /// Sampled uniformly with microsecond granularity. `None` retries
    /// immediately.
    pub retry_jitter: Option<Duration>,
}

/// How a window was touched by `record_request`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowOutcome {
    /// First request of the window: the counter was created with a fresh TTL.
    Created,
    /// The counter already existed and was incremented.
    Incremented { count: u64, ttl: Ttl },
}

/// Reset instant for a counter with `left` to live.
///
/// A TTL of zero means the key is about to expire and the next window starts
/// now. A TTL too large for the clock falls back to one period.
fn window_end(now: SystemTime, left: Duration, rate: &Rate) -> SystemTime {
    if left.is_zero() {
        return now + rate.period();
    }

    now.checked_add(left).unwrap_or(now + rate.period())
}

/// Uniform random pause in `[0, max]` with microsecond granularity.
pub(crate) fn jitter_delay(max: Duration) -> Duration {
    let max_us = u64::try_from(max.as_micros()).unwrap_or(u64::MAX);
    if max_us == 0 {
        return Duration::ZERO;
    }

    Duration::from_micros(rand::random_range(0..=max_us))
}

/// Result of a single transaction attempt.
enum Attempt {
    Committed(LimitRecord),
    Conflict,
}

/// Fixed-window counter store on top of any [`Backend`].
///
/// # Algorithm
///
/// 1. Watch `<prefix>:<key>`.
/// 2. Try to create the counter at 1 with TTL = period, only if absent. On
///    success the window just started.
/// 3. Otherwise increment and read the TTL in one MULTI/EXEC unit. A concurrent
///    write to the key aborts the unit and the attempt is retried.
/// 4. A counter without expiry gets its TTL restored; a counter that vanished
///    fails the call with [`RatewatchError::KeyVanished`].
///
/// The TTL is fixed when the window is created and never refreshed by later
/// increments.
///
/// # Cancellation
///
/// Dropping the returned future cancels the call, and
/// [`StoreOptions::operation_timeout`] does so on a deadline. Each transaction
/// either commits fully or not at all, but a commit that lands server-side after
/// the client gave up still counts. Calls are therefore not idempotent across a
/// timeout.
pub struct FixedWindowStore<B> {
    backend: B,
    prefix: KeyPrefix,
    retry_limit: RetryLimit,
    operation_timeout: Option<Duration>,
    retry_jitter: Option<Duration>,
}

impl<B: Backend> FixedWindowStore<B> {
    /// Create a new store over `backend`.
    pub fn new(backend: B, options: StoreOptions) -> Self {
        Self {
            backend,
            prefix: options.prefix.unwrap_or_else(KeyPrefix::default_prefix),
            retry_limit: options.retry_limit,
            operation_timeout: options.operation_timeout,
            retry_jitter: options.retry_jitter,
        }
    }

    /// Access the backing store.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Configured key namespace.
    pub fn prefix(&self) -> &KeyPrefix {
        &self.prefix
    }

    async fn try_record(&self, store_key: &str, rate: &Rate) -> Result<Attempt, RatewatchError> {
        let mut tx = self.backend.watch(store_key).await?;

        let outcome = if tx.create_if_absent(rate.period()).await? {
            WindowOutcome::Created
        } else {
            match tx.increment().await? {
                Some((count, ttl)) => WindowOutcome::Incremented { count, ttl },
                None => {
                    tx.finish().await?;
                    return Ok(Attempt::Conflict);
                }
            }
        };

        let now = SystemTime::now();
        let record = match outcome {
            WindowOutcome::Created => LimitRecord::new(rate, now + rate.period(), 1),
            WindowOutcome::Incremented { count, ttl } => {
                let expiration = match ttl {
                    Ttl::Expires(left) => window_end(now, left, rate),
                    Ttl::Persistent => {
                        tracing::warn!(key = store_key, "counter has no expiry, restoring window ttl");

                        if !tx.expire(rate.period()).await? {
                            return Err(RatewatchError::ExpirySetFailed {
                                key: store_key.to_string(),
                            });
                        }

                        now + rate.period()
                    }
                    Ttl::Missing => {
                        return Err(RatewatchError::KeyVanished {
                            key: store_key.to_string(),
                        });
                    }
                };

                LimitRecord::new(rate, expiration, count)
            }
        };

        tx.finish().await?;

        Ok(Attempt::Committed(record))
    } // end method try_record

    async fn try_check(&self, store_key: &str, rate: &Rate) -> Result<Attempt, RatewatchError> {
        let mut tx = self.backend.watch(store_key).await?;

        let Some((count, ttl)) = tx.read().await? else {
            tx.finish().await?;
            return Ok(Attempt::Conflict);
        };

        tx.finish().await?;

        let now = SystemTime::now();
        let expiration = match ttl {
            Ttl::Expires(left) => window_end(now, left, rate),
            _ => now + rate.period(),
        };

        Ok(Attempt::Committed(LimitRecord::new(rate, expiration, count)))
    } // end method try_check

    async fn with_retries<F, Fut>(
        &self,
        store_key: &str,
        operation: &'static str,
        mut attempt: F,
    ) -> Result<LimitRecord, RatewatchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Attempt, RatewatchError>>,
    {
        let attempts = *self.retry_limit;

        for n in 1..=attempts {
            match attempt().await? {
                Attempt::Committed(record) => return Ok(record),
                Attempt::Conflict => {
                    tracing::debug!(key = store_key, operation, attempt = n, "transaction conflict");

                    if n < attempts {
                        self.pause().await;
                    }
                }
            }
        }

        Err(RatewatchError::TransactionConflictExhausted {
            key: store_key.to_string(),
            attempts,
        })
    }

    async fn with_deadline<Fut>(&self, store_key: &str, fut: Fut) -> Result<LimitRecord, RatewatchError>
    where
        Fut: Future<Output = Result<LimitRecord, RatewatchError>>,
    {
        match self.operation_timeout {
            Some(timeout) => runtime::timeout(timeout, fut)
                .await
                .unwrap_or_else(|| {
                    Err(RatewatchError::Timeout {
                        key: store_key.to_string(),
                        timeout,
                    })
                }),
            None => fut.await,
        }
    }

    async fn pause(&self) {
        if let Some(max) = self.retry_jitter {
            let delay = jitter_delay(max);
            if !delay.is_zero() {
                runtime::sleep(delay).await;
            }
        }
    }
}

#[async_trait]
impl<B: Backend> CounterStore for FixedWindowStore<B> {
    async fn record_request(&self, key: &str, rate: &Rate) -> Result<LimitRecord, RatewatchError> {
        let store_key = self.prefix.store_key(key);

        self.with_deadline(
            &store_key,
            self.with_retries(&store_key, "record_request", || {
                self.try_record(&store_key, rate)
            }),
        )
        .await
    }

    async fn check_limit(&self, key: &str, rate: &Rate) -> Result<LimitRecord, RatewatchError> {
        let store_key = self.prefix.store_key(key);

        self.with_deadline(
            &store_key,
            self.with_retries(&store_key, "check_limit", || self.try_check(&store_key, rate)),
        )
        .await
    }
}

use std::{
    ops::Deref,
    sync::Arc,
    time::{Duration, SystemTime},
};

use crate::RatewatchError;

/// An allowance: at most `limit` requests per `period`.
///
/// The limit is strictly positive and the period lies within
/// [`Rate::MIN_PERIOD`] and [`Rate::MAX_PERIOD`]. Anything else is rejected when
/// the rate is built, so a [`Rate`] in hand is always valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rate {
    limit: u64,
    period: Duration,
}

impl Rate {
    /// Shortest accepted window. Backing store TTLs have millisecond resolution.
    pub const MIN_PERIOD: Duration = Duration::from_millis(1);

    /// Longest accepted window, about 136 years.
    pub const MAX_PERIOD: Duration = Duration::from_secs(u32::MAX as u64);

    /// Create a new [`Rate`].
    pub fn new(limit: u64, period: Duration) -> Result<Self, RatewatchError> {
        if limit == 0 {
            return Err(RatewatchError::InvalidRate(
                "limit must be greater than 0".to_string(),
            ));
        }

        if period.is_zero() {
            return Err(RatewatchError::InvalidRate(
                "period must be greater than 0".to_string(),
            ));
        }

        if period < Self::MIN_PERIOD || period > Self::MAX_PERIOD {
            return Err(RatewatchError::InvalidRate(format!(
                "period must be between {:?} and {:?}, got {period:?}",
                Self::MIN_PERIOD,
                Self::MAX_PERIOD,
            )));
        }

        Ok(Self { limit, period })
    }

    /// `limit` requests per second.
    pub fn per_second(limit: u64) -> Result<Self, RatewatchError> {
        Self::new(limit, Duration::from_secs(1))
    }

    /// `limit` requests per minute.
    pub fn per_minute(limit: u64) -> Result<Self, RatewatchError> {
        Self::new(limit, Duration::from_secs(60))
    }

    /// `limit` requests per hour.
    pub fn per_hour(limit: u64) -> Result<Self, RatewatchError> {
        Self::new(limit, Duration::from_secs(60 * 60))
    }

    /// Maximum number of requests in one window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Length of one window.
    pub fn period(&self) -> Duration {
        self.period
    }
}

/// Outcome of a limiter decision for one identifier at one instant.
///
/// Built fresh for every decision and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitRecord {
    limit: u64,
    remaining: u64,
    reset: SystemTime,
    limit_reached: bool,
}

impl LimitRecord {
    /// Derive a record from a rate, the window expiration and the count observed
    /// in the backing store.
    ///
    /// A count equal to the limit still fits in the window; only counts above it
    /// mark the limit as reached.
    pub fn new(rate: &Rate, expiration: SystemTime, observed_count: u64) -> Self {
        let (remaining, limit_reached) = match rate.limit.checked_sub(observed_count) {
            Some(remaining) => (remaining, false),
            None => (0, true),
        };

        Self {
            limit: rate.limit,
            remaining,
            reset: expiration,
            limit_reached,
        }
    }

    /// Configured limit for the window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Requests still allowed in the current window.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Instant at which the current window ends.
    pub fn reset(&self) -> SystemTime {
        self.reset
    }

    /// Whether the identifier went over its allowance.
    pub fn is_limit_reached(&self) -> bool {
        self.limit_reached
    }

    /// Whole seconds until [`reset`](Self::reset), never negative.
    pub fn seconds_remaining(&self) -> u64 {
        self.seconds_remaining_at(SystemTime::now())
    }

    /// Same as [`seconds_remaining`](Self::seconds_remaining) against an explicit clock.
    pub fn seconds_remaining_at(&self, now: SystemTime) -> u64 {
        self.reset
            .duration_since(now)
            .map(|left| left.as_secs())
            .unwrap_or(0)
    }
}

/// Maximum number of optimistic transaction attempts per call.
///
/// Must be at least 1. Defaults to 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RetryLimit(u32);

impl Default for RetryLimit {
    fn default() -> Self {
        Self(3)
    }
}

impl Deref for RetryLimit {
    type Target = u32;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u32> for RetryLimit {
    type Error = RatewatchError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value == 0 {
            Err(RatewatchError::InvalidRetryLimit(
                "retry limit must be at least 1".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }
}

/// A validated key namespace.
///
/// This is a string with the following constraints:
/// - Must not be empty
/// - Must not be longer than 255 bytes
/// - Must not contain colons
#[derive(Debug, Clone, PartialEq, PartialOrd, Hash, Eq)]
pub struct KeyPrefix(Arc<str>);

impl KeyPrefix {
    /// The prefix used when none is configured.
    pub fn default_prefix() -> Self {
        Self(Arc::from("ratewatch"))
    }

    /// Build the store key for `identifier`: `<prefix>:<identifier>`.
    pub fn store_key(&self, identifier: &str) -> String {
        format!("{}:{}", self.0, identifier)
    }
}

impl Default for KeyPrefix {
    fn default() -> Self {
        Self::default_prefix()
    }
}

impl Deref for KeyPrefix {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<String> for KeyPrefix {
    type Error = RatewatchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err(RatewatchError::InvalidKeyPrefix(
                "key prefix must not be empty".to_string(),
            ))
        } else if value.len() > 255 {
            Err(RatewatchError::InvalidKeyPrefix(
                "key prefix must not be longer than 255 bytes".to_string(),
            ))
        } else if value.contains(':') {
            Err(RatewatchError::InvalidKeyPrefix(
                "key prefix must not contain colons".to_string(),
            ))
        } else {
            Ok(Self(Arc::from(value)))
        }
    }
}

impl TryFrom<&str> for KeyPrefix {
    type Error = RatewatchError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

//! Redis backing store.
//!
//! Counters live under `<prefix>:<identifier>` as plain integers with a native
//! Redis TTL. Concurrent writers are serialized by WATCH / MULTI / EXEC rather
//! than Lua scripts or locks.
//!
//! # Requirements
//!
//! - **Redis version:** >= 2.6 (`SET ... NX PX`, `PTTL`)
//! - **Runtime:** Tokio or Smol (via `redis-tokio` or `redis-smol` features)
//!
//! # Examples
//!
//! ```ignore
//! use ratewatch::{KeyPrefix, Limiter, Rate, RetryLimit, StoreOptions};
//! use ratewatch::redis::{RatewatchRedisClient, RedisCounterStore};
//!
//! let client = redis::Client::open("redis://127.0.0.1:6379/")?;
//! let pool = RatewatchRedisClient::from_client(client, 8).await?;
//!
//! let store = RedisCounterStore::redis(pool, StoreOptions {
//!     prefix: Some(KeyPrefix::try_from("api")?), // Keys: api:<identifier>
//!     retry_limit: RetryLimit::try_from(10)?,
//!     ..StoreOptions::default()
//! });
//!
//! let limiter = Limiter::new(store, Rate::per_minute(100)?);
//! let record = limiter.record_request("203.0.113.7").await?;
//! ```

mod common;
pub use common::*;

mod redis_backend;
pub use redis_backend::*;

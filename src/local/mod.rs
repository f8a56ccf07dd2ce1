//! In-process backing store.
//!
//! [`MemoryBackend`] keeps counters in a [`DashMap`](dashmap::DashMap) and
//! emulates Redis' WATCH semantics with per-counter versions, so the same
//! fixed-window algorithm runs unchanged on top of it.
//!
//! # Key Characteristics
//!
//! - **Thread-safe:** Safe for concurrent use across tasks and threads
//! - **Zero external dependencies:** No network or database required
//! - **Process-scoped:** State is not shared across processes
//!
//! # Examples
//!
//! ```no_run
//! use ratewatch::{Limiter, Rate, StoreOptions};
//! use ratewatch::local::MemoryCounterStore;
//!
//! # async fn run() -> Result<(), ratewatch::RatewatchError> {
//! let store = MemoryCounterStore::in_memory(StoreOptions::default());
//! let limiter = Limiter::new(store, Rate::per_minute(100)?);
//!
//! let record = limiter.record_request("203.0.113.7").await?;
//! assert_eq!(record.remaining(), 99);
//! # Ok(())
//! # }
//! ```

mod memory_backend;
pub use memory_backend::*;

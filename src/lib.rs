#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod limiter;
pub use limiter::*;

mod store;
pub use store::*;

pub mod backend;

pub mod local;
pub use local::*;

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "redis-tokio", feature = "redis-smol"))))]
pub mod redis;
#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
pub use self::redis::*;

#[cfg(feature = "http")]
#[cfg_attr(docsrs, doc(cfg(feature = "http")))]
pub mod http;

mod error;
pub use error::*;

mod common;
pub use common::{KeyPrefix, LimitRecord, Rate, RetryLimit};

mod runtime;

#[cfg(test)]
mod tests;

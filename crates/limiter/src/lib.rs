//! Distributed admission control for a shared store.
//!
//! This crate decides whether a caller may proceed by running atomic scripts
//! against counter state shared by every process using the same store:
//! - Concurrent in-flight calls per identity
//! - Smoothed rate through a token bucket with reserve and bounded borrowing
//! - Fixed window request quota
//!
//! Every admission attempt returns an [`Acquire`]. Store faults never escape as
//! errors, they are logged and reported as [`Acquire::Exception`].

#![deny(missing_docs)]

mod acquire;
mod concurrent;
mod distributed;
mod error;
mod limiter;
mod rate;
mod request;
mod storage;
#[cfg(test)]
mod testing;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub use acquire::Acquire;
pub use concurrent::ConcurrentLimiter;
pub use distributed::DistributedLimiter;
pub use error::LimiterError;
pub use limiter::Limiter;
pub use rate::RateLimiter;
pub use request::RequestLimiter;
pub use storage::{InMemoryStore, RedisStore, Script, Storage, Store, StoreError};

/// Milliseconds since the Unix epoch on this host's clock.
pub(crate) fn now_millis() -> i64 {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    millis(elapsed)
}

pub(crate) fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

//! Stores that execute the limiter scripts atomically.

use std::future::Future;
use std::time::Duration;

use config::StorageConfig;

pub mod memory;
pub mod redis;
mod redis_pool;

pub use self::memory::InMemoryStore;
pub use self::redis::RedisStore;

/// An atomic admission script known to every store.
///
/// Each script has a fixed positional argument layout. The store binds the
/// caller's keys and values and runs the whole script as one indivisible step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Script {
    /// `[max_concurrent, direction, lease_millis]`, direction 0 acquires and 1 releases.
    Concurrent,
    /// `[permits, now_millis, reserved_percent, max_wait_millis, capacity, interval_millis]`.
    Rate,
    /// `[max_permit_request, interval_millis, now_millis]`.
    Request,
}

impl Script {
    /// Every script, in a stable order.
    pub const ALL: [Script; 3] = [Script::Concurrent, Script::Rate, Script::Request];

    /// Name of the script, also used to namespace its keys.
    pub fn name(self) -> &'static str {
        match self {
            Script::Concurrent => "limiter_concurrent",
            Script::Rate => "limiter_rate",
            Script::Request => "limiter_request",
        }
    }

    /// Lua source run by Redis.
    pub fn source(self) -> &'static str {
        match self {
            Script::Concurrent => include_str!("../../scripts/limiter_concurrent.lua"),
            Script::Rate => include_str!("../../scripts/limiter_rate.lua"),
            Script::Request => include_str!("../../scripts/limiter_request.lua"),
        }
    }

    /// Number of positional values the script expects.
    pub fn arity(self) -> usize {
        match self {
            Script::Concurrent | Script::Request => 3,
            Script::Rate => 6,
        }
    }
}

/// A client able to run limiter scripts against shared counter state.
pub trait Store: Send + Sync {
    /// Runs `script` with `keys` and positional `values`, giving up after `timeout`.
    ///
    /// `Ok(None)` means the script produced no value.
    fn eval(
        &self,
        script: Script,
        timeout: Duration,
        keys: &[&str],
        values: &[i64],
    ) -> impl Future<Output = Result<Option<i64>, StoreError>> + Send;
}

/// Errors that can occur in storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or set up.
    #[error("Connection error: {0}")]
    Connection(String),
    /// No pooled client could be checked out.
    #[error("Pool error: {0}")]
    Pool(String),
    /// The store rejected or failed the script.
    #[error("Query error: {0}")]
    Query(String),
    /// The script did not finish in time.
    #[error("Script timed out after {0:?}")]
    Timeout(Duration),
    /// The script answered with something other than an integer.
    #[error("Unexpected script result: {0}")]
    UnexpectedResult(String),
}

/// Storage backend selected from configuration.
pub enum Storage {
    /// Counters held by this process only.
    Memory(InMemoryStore),
    /// Counters shared through Redis.
    Redis(RedisStore),
}

impl Storage {
    /// Creates the configured backend. Redis connectivity is checked once.
    pub async fn new(config: &StorageConfig) -> Result<Self, StoreError> {
        let storage = match config {
            StorageConfig::Memory => Storage::Memory(InMemoryStore::new()),
            StorageConfig::Redis(redis_config) => Storage::Redis(RedisStore::new(redis_config).await?),
        };

        Ok(storage)
    }
}

impl Store for Storage {
    async fn eval(
        &self,
        script: Script,
        timeout: Duration,
        keys: &[&str],
        values: &[i64],
    ) -> Result<Option<i64>, StoreError> {
        match self {
            Storage::Memory(store) => store.eval(script, timeout, keys, values).await,
            Storage::Redis(store) => store.eval(script, timeout, keys, values).await,
        }
    }
}

/// Bounds a script execution by `timeout`.
pub(crate) async fn with_timeout<T>(
    timeout: Duration,
    execution: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    tokio::time::timeout(timeout, execution)
        .await
        .map_err(|_| StoreError::Timeout(timeout))?
}

/// Checks the key and value counts before anything touches the store.
pub(crate) fn check_arguments(script: Script, keys: &[&str], values: &[i64]) -> Result<(), StoreError> {
    if keys.len() != 1 {
        return Err(StoreError::Query(format!(
            "{} expects exactly one key, got {}",
            script.name(),
            keys.len()
        )));
    }

    if values.len() != script.arity() {
        return Err(StoreError::Query(format!(
            "{} expects {} values, got {}",
            script.name(),
            script.arity(),
            values.len()
        )));
    }

    Ok(())
}

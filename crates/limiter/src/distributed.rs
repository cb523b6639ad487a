//! The three admission disciplines of one protected resource.

use std::sync::Arc;

use config::{LimiterConfig, StorageConfig};

use crate::error::LimiterError;
use crate::storage::{Storage, Store};
use crate::{Acquire, ConcurrentLimiter, Limiter, RateLimiter, RequestLimiter};

/// Concurrency, rate and request-window limiters for one identity.
///
/// The three limiters share the store handle and the configuration but keep
/// independent counters, so they can be evaluated in any order or
/// concurrently. Which of them to consult is up to the caller.
pub struct DistributedLimiter<S = Storage> {
    config: Arc<LimiterConfig>,
    concurrent: ConcurrentLimiter<S>,
    rate: RateLimiter<S>,
    request: RequestLimiter<S>,
}

impl<S: Store> DistributedLimiter<S> {
    /// Creates the limiters of `config.identity`, all evaluating against `store`.
    pub fn new(store: Arc<S>, config: LimiterConfig) -> Result<Self, LimiterError> {
        config
            .validate()
            .map_err(|e| LimiterError::InvalidConfig(e.to_string()))?;

        for warning in config.warnings() {
            log::warn!("{warning}");
        }

        let config = Arc::new(config);

        Ok(Self {
            concurrent: ConcurrentLimiter::new(store.clone(), config.clone()),
            rate: RateLimiter::new(store.clone(), config.clone()),
            request: RequestLimiter::new(store, config.clone()),
            config,
        })
    }

    /// The configuration these limiters were built from.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Tries to take one of the `max_concurrent` slots.
    pub async fn try_acquire_concurrent(&self) -> Acquire {
        self.concurrent.try_acquire().await
    }

    /// Gives a concurrency slot back. Failures are only logged.
    pub async fn release_concurrent(&self) {
        self.concurrent.release().await;
    }

    /// Tries to take `rate.permits` tokens from the bucket.
    pub async fn try_acquire_rate(&self) -> Acquire {
        self.rate.try_acquire().await
    }

    /// Counts one call against the current request window.
    pub async fn try_acquire_request(&self) -> Acquire {
        self.request.try_acquire().await
    }

    /// The concurrency limiter.
    pub fn concurrent(&self) -> &ConcurrentLimiter<S> {
        &self.concurrent
    }

    /// The token bucket limiter.
    pub fn rate(&self) -> &RateLimiter<S> {
        &self.rate
    }

    /// The request-window limiter.
    pub fn request(&self) -> &RequestLimiter<S> {
        &self.request
    }
}

impl DistributedLimiter<Storage> {
    /// Creates a dedicated storage backend and the limiters of `config.identity`.
    ///
    /// Processes protecting several resources should create one [`Storage`] and
    /// share it through [`DistributedLimiter::new`] instead.
    pub async fn connect(storage: &StorageConfig, config: LimiterConfig) -> Result<Self, LimiterError> {
        let storage = Storage::new(storage).await?;
        Self::new(Arc::new(storage), config)
    }
}

//! Smoothed rate limit backed by a token bucket.

use std::sync::Arc;

use config::LimiterConfig;

use crate::storage::{Script, Store};
use crate::{Acquire, Limiter, millis, now_millis};

/// Token bucket holding `max_permit_request` tokens, refilled over `request_interval`.
///
/// The refill, the decision and the debit all happen inside one script, so
/// concurrent callers across processes never observe a half-updated bucket.
/// A share of the capacity can be held in reserve, and a caller may borrow
/// against future refills for at most `rate.max_wait`.
pub struct RateLimiter<S> {
    store: Arc<S>,
    config: Arc<LimiterConfig>,
}

impl<S: Store> RateLimiter<S> {
    /// Creates a limiter evaluating against `store`.
    pub fn new(store: Arc<S>, config: Arc<LimiterConfig>) -> Self {
        Self { store, config }
    }

    /// Tries to take `rate.permits` tokens as of `now_millis` on the caller's clock.
    pub async fn try_acquire_at(&self, now_millis: i64) -> Acquire {
        let values = self.values(now_millis);

        let reply = self
            .store
            .eval(
                Script::Rate,
                self.config.request_timeout,
                &[self.config.identity.as_str()],
                &values,
            )
            .await;

        Acquire::from_reply(Script::Rate, &self.config.identity, reply)
    }

    fn values(&self, now_millis: i64) -> [i64; 6] {
        let config = &self.config;

        [
            i64::from(config.rate.permits),
            now_millis,
            i64::from(config.rate.reserved_percent),
            millis(config.rate.max_wait),
            i64::from(config.max_permit_request),
            millis(config.request_interval),
        ]
    }
}

impl<S: Store> Limiter for RateLimiter<S> {
    async fn try_acquire(&self) -> Acquire {
        self.try_acquire_at(now_millis()).await
    }
}

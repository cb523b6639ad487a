//! Fixed window request quota.

use std::sync::Arc;

use config::LimiterConfig;

use crate::storage::{Script, Store};
use crate::{Acquire, Limiter, millis, now_millis};

/// Admits at most `max_permit_request` calls per `request_interval` window.
///
/// Quota is never handed back early, the counter only resets when a call
/// arrives after the window has elapsed.
pub struct RequestLimiter<S> {
    store: Arc<S>,
    config: Arc<LimiterConfig>,
}

impl<S: Store> RequestLimiter<S> {
    /// Creates a limiter evaluating against `store`.
    pub fn new(store: Arc<S>, config: Arc<LimiterConfig>) -> Self {
        Self { store, config }
    }

    /// Counts a call against the window containing `now_millis`.
    pub async fn try_acquire_at(&self, now_millis: i64) -> Acquire {
        let values = [
            i64::from(self.config.max_permit_request),
            millis(self.config.request_interval),
            now_millis,
        ];

        let reply = self
            .store
            .eval(
                Script::Request,
                self.config.request_timeout,
                &[self.config.identity.as_str()],
                &values,
            )
            .await;

        Acquire::from_reply(Script::Request, &self.config.identity, reply)
    }
}

impl<S: Store> Limiter for RequestLimiter<S> {
    async fn try_acquire(&self) -> Acquire {
        self.try_acquire_at(now_millis()).await
    }
}

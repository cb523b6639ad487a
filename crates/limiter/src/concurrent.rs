//! Limit on simultaneous in-flight calls.

use std::sync::Arc;

use config::LimiterConfig;

use crate::storage::{Script, Store, StoreError};
use crate::{Acquire, Limiter, millis};

const ACQUIRE: i64 = 0;
const RELEASE: i64 = 1;

/// Bounds how many callers hold a permit for the same identity at once.
///
/// Acquire and release run the same script, so the check-and-increment and
/// the decrement both see one consistent counter. The counter expires after
/// the configured lease, which reclaims slots of holders that never release.
pub struct ConcurrentLimiter<S> {
    store: Arc<S>,
    config: Arc<LimiterConfig>,
}

impl<S: Store> ConcurrentLimiter<S> {
    /// Creates a limiter evaluating against `store`.
    pub fn new(store: Arc<S>, config: Arc<LimiterConfig>) -> Self {
        Self { store, config }
    }

    fn values(&self, direction: i64) -> [i64; 3] {
        [
            i64::from(self.config.max_concurrent),
            direction,
            millis(self.config.concurrent_lease()),
        ]
    }

    async fn eval(&self, direction: i64) -> Result<Option<i64>, StoreError> {
        let values = self.values(direction);

        self.store
            .eval(
                Script::Concurrent,
                self.config.concurrent_timeout,
                &[self.config.identity.as_str()],
                &values,
            )
            .await
    }
}

impl<S: Store> Limiter for ConcurrentLimiter<S> {
    async fn try_acquire(&self) -> Acquire {
        Acquire::from_reply(Script::Concurrent, &self.config.identity, self.eval(ACQUIRE).await)
    }

    async fn release(&self) {
        let identity = &self.config.identity;

        match self.eval(RELEASE).await {
            Ok(Some(_)) => log::debug!("Released concurrent permit for '{identity}'"),
            Ok(None) => log::error!("Releasing concurrent permit for '{identity}' returned no value"),
            Err(e) => log::error!("Failed to release concurrent permit for '{identity}': {e}"),
        }
    }
}

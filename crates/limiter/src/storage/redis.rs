//! Redis-based store executing the limiter scripts as Lua.

use std::time::Duration;

use redis::{ErrorKind, RedisError};

use super::redis_pool::{Connection, Pool, create_pool};
use super::{Script, Store, StoreError, check_arguments, with_timeout};
use config::RedisConfig;

/// Redis-based store implementation.
///
/// Scripts are sent with EVALSHA and loaded on the first `NOSCRIPT` reply, so
/// every process sharing the server runs the very same script bodies.
pub struct RedisStore {
    /// Redis connection pool.
    pool: Pool,
    /// Key prefix for all limiter keys.
    key_prefix: String,
    concurrent: redis::Script,
    rate: redis::Script,
    request: redis::Script,
}

impl RedisStore {
    /// Create a new Redis store and check the server answers.
    pub async fn new(config: &RedisConfig) -> Result<Self, StoreError> {
        let store = Self::connect_lazy(config)?;

        let mut conn = store.borrow().await?;

        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to ping Redis server: {e}")))?;

        log::debug!("Connected to Redis at {}", config.url);

        Ok(store)
    }

    /// Create a new Redis store without contacting the server.
    ///
    /// Connections are opened on first use. While the server is unreachable
    /// every evaluation fails, which limiters report as an exception.
    pub fn connect_lazy(config: &RedisConfig) -> Result<Self, StoreError> {
        let pool = create_pool(config)
            .map_err(|e| StoreError::Connection(format!("Failed to create Redis connection pool: {e}")))?;

        Ok(Self::with_pool(pool, config.key_prefix.clone()))
    }

    fn with_pool(pool: Pool, key_prefix: String) -> Self {
        Self {
            pool,
            key_prefix,
            concurrent: redis::Script::new(Script::Concurrent.source()),
            rate: redis::Script::new(Script::Rate.source()),
            request: redis::Script::new(Script::Request.source()),
        }
    }

    /// Checks a connection out of the pool.
    ///
    /// Only waits for a free connection, bounded by the pool's wait timeout.
    pub async fn borrow(&self) -> Result<Connection, StoreError> {
        self.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))
    }

    fn script(&self, script: Script) -> &redis::Script {
        match script {
            Script::Concurrent => &self.concurrent,
            Script::Rate => &self.rate,
            Script::Request => &self.request,
        }
    }

    /// Namespaces `key` per script, so the three limiters of one identity never share a key.
    fn key(&self, script: Script, key: &str) -> String {
        format!("{}{}:{}", self.key_prefix, script.name(), key)
    }
}

impl Store for RedisStore {
    async fn eval(
        &self,
        script: Script,
        timeout: Duration,
        keys: &[&str],
        values: &[i64],
    ) -> Result<Option<i64>, StoreError> {
        check_arguments(script, keys, values)?;

        let mut invocation = self.script(script).prepare_invoke();

        for key in keys {
            invocation.key(self.key(script, key));
        }

        for value in values {
            invocation.arg(*value);
        }

        let mut conn = self.borrow().await?;

        with_timeout(timeout, async {
            invocation
                .invoke_async::<Option<i64>>(&mut *conn)
                .await
                .map_err(query_error)
        })
        .await
    }
}

fn query_error(error: RedisError) -> StoreError {
    match error.kind() {
        ErrorKind::TypeError => StoreError::UnexpectedResult(error.to_string()),
        _ => StoreError::Query(error.to_string()),
    }
}

//! Redis connection pool shared by every limiter of the process.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use deadpool::managed::{self, Metrics};
use redis::{Client, ErrorKind, RedisError, RedisResult, aio::MultiplexedConnection};

use config::{RedisConfig, RedisTlsConfig};

/// Redis connection pool.
pub type Pool = deadpool::managed::Pool<Manager>;

/// A connection checked out of the pool, returned on drop.
pub type Connection = deadpool::managed::Object<Manager>;

/// Manager for Redis connections.
#[derive(Debug)]
pub struct Manager {
    client: Client,
    connection_timeout: Option<Duration>,
    ping_number: AtomicUsize,
}

impl Manager {
    /// Create a new Redis pool manager.
    pub fn new(config: &RedisConfig) -> RedisResult<Self> {
        let client = match &config.tls {
            Some(tls_config) if !tls_config.enabled => Client::open(config.url.as_str())?,
            Some(tls_config) if tls_config.insecure.unwrap_or(false) => Client::open(insecure_url(&config.url))?,
            Some(tls_config) => Client::build_with_tls(config.url.clone(), build_tls_certificates(tls_config)?)?,
            None => Client::open(config.url.as_str())?,
        };

        Ok(Self {
            client,
            connection_timeout: config.connection_timeout,
            ping_number: AtomicUsize::new(0),
        })
    }
}

impl managed::Manager for Manager {
    type Type = MultiplexedConnection;
    type Error = RedisError;

    async fn create(&self) -> Result<MultiplexedConnection, Self::Error> {
        let connect = self.client.get_multiplexed_async_connection();

        match self.connection_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect)
                .await
                .map_err(|_| RedisError::from((ErrorKind::IoError, "Timed out connecting to Redis")))?,
            None => connect.await,
        }
    }

    async fn recycle(&self, conn: &mut MultiplexedConnection, _: &Metrics) -> managed::RecycleResult<Self::Error> {
        let ping_number = self.ping_number.fetch_add(1, Ordering::Relaxed).to_string();

        let (n,) = redis::Pipeline::with_capacity(2)
            .cmd("UNWATCH")
            .ignore()
            .cmd("PING")
            .arg(&ping_number)
            .query_async::<(String,)>(conn)
            .await?;

        if n == ping_number {
            Ok(())
        } else {
            Err(managed::RecycleError::message("Invalid PING response"))
        }
    }
}

/// Skips certificate validation through the URL fragment understood by the redis crate.
fn insecure_url(url: &str) -> String {
    if url.ends_with("#insecure") {
        url.to_string()
    } else {
        format!("{url}#insecure")
    }
}

/// Build TLS certificates from configuration.
fn build_tls_certificates(config: &RedisTlsConfig) -> RedisResult<redis::TlsCertificates> {
    use redis::ClientTlsConfig;

    let mut client_tls = None;
    let mut root_cert = None;

    if let (Some(cert_path), Some(key_path)) = (&config.client_cert_path, &config.client_key_path) {
        let client_cert = read_pem(cert_path, "Failed to read client certificate")?;
        let client_key = read_pem(key_path, "Failed to read client key")?;

        client_tls = Some(ClientTlsConfig {
            client_cert,
            client_key,
        });
    }

    if let Some(ca_path) = &config.ca_cert_path {
        root_cert = Some(read_pem(ca_path, "Failed to read CA certificate")?);
    }

    Ok(redis::TlsCertificates { client_tls, root_cert })
}

fn read_pem(path: &str, description: &'static str) -> RedisResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| RedisError::from((ErrorKind::IoError, description, format!("{path}: {e}"))))
}

/// Create a Redis connection pool from configuration.
pub fn create_pool(config: &RedisConfig) -> RedisResult<Pool> {
    let manager = Manager::new(config)?;

    let mut pool_config = deadpool::managed::PoolConfig::default();

    if let Some(max_size) = config.pool.max_size {
        pool_config.max_size = max_size;
    }

    pool_config.timeouts.create = config.pool.timeout_create;
    pool_config.timeouts.wait = config.pool.timeout_wait;
    pool_config.timeouts.recycle = config.pool.timeout_recycle;

    let pool = Pool::builder(manager)
        .config(pool_config)
        .runtime(deadpool::Runtime::Tokio1)
        .build()
        .map_err(|e| RedisError::from((ErrorKind::IoError, "Failed to create pool", e.to_string())))?;

    Ok(pool)
}

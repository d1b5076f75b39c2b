//! 0-db shard transport
//!
//! Speaks the Redis-style protocol of a 0-db storage node: SELECT to bind
//! the namespace, SET with an empty key to store (the server replies with
//! the content key), GET/DEL/CHECK to operate on objects and NSINFO for
//! namespace statistics.
//!
//! Connections are pooled: at most `max_connections` live sessions, callers
//! wait when the pool is exhausted, and a connection idle for longer than
//! `idle_ping_interval` is pinged before reuse.

use crate::client::{NamespaceHealth, NamespaceInfo, ObjectKey, ObjectStatus, ShardClient};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stratus_core::{Result, StratusError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

/// Configuration for one 0-db shard session
#[derive(Debug, Clone)]
pub struct ZdbConfig {
    /// Shard address, `host:port`
    pub address: String,
    /// Namespace to SELECT after connecting
    pub namespace: String,
    /// Namespace password, if the shard requires one
    pub password: Option<String>,
    /// Timeout for establishing a connection
    pub connect_timeout: Duration,
    /// Timeout for read-style commands (GET, CHECK, NSINFO)
    pub read_timeout: Duration,
    /// Timeout for write-style commands (SET, DEL)
    pub write_timeout: Duration,
    /// Maximum number of pooled connections
    pub max_connections: usize,
    /// Idle duration after which a pooled connection is pinged before reuse
    pub idle_ping_interval: Duration,
}

impl Default for ZdbConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            namespace: String::new(),
            password: None,
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(60),
            max_connections: 5,
            idle_ping_interval: Duration::from_secs(60),
        }
    }
}

struct PooledConn {
    conn: MultiplexedConnection,
    last_used: Instant,
}

struct ConnectionPool {
    client: redis::Client,
    config: ZdbConfig,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<PooledConn>>,
}

/// A borrowed pool connection. Returned to the pool on drop unless
/// [`ConnGuard::discard`] was called.
struct ConnGuard<'a> {
    conn: Option<MultiplexedConnection>,
    pool: &'a ConnectionPool,
    _permit: OwnedSemaphorePermit,
}

impl ConnGuard<'_> {
    fn conn(&mut self) -> &mut MultiplexedConnection {
        self.conn.as_mut().expect("connection taken before discard")
    }

    /// Drop the connection instead of returning it to the pool
    fn discard(&mut self) {
        self.conn = None;
    }
}

impl Drop for ConnGuard<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.idle.lock().push(PooledConn {
                conn,
                last_used: Instant::now(),
            });
        }
    }
}

impl ConnectionPool {
    fn new(client: redis::Client, config: ZdbConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_connections.max(1)));
        Self {
            client,
            config,
            permits,
            idle: Mutex::new(Vec::new()),
        }
    }

    async fn acquire(&self) -> Result<ConnGuard<'_>> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StratusError::Internal("connection pool closed".to_string()))?;

        // Prefer an idle connection; ping it if it has been unused for a while.
        loop {
            let candidate = self.idle.lock().pop();
            let Some(mut pooled) = candidate else { break };

            if pooled.last_used.elapsed() < self.config.idle_ping_interval {
                return Ok(ConnGuard {
                    conn: Some(pooled.conn),
                    pool: self,
                    _permit: permit,
                });
            }

            let ping = redis::cmd("PING");
            let pong: std::result::Result<redis::RedisResult<()>, _> = tokio::time::timeout(
                self.config.read_timeout,
                ping.query_async(&mut pooled.conn),
            )
            .await;
            match pong {
                Ok(Ok(())) => {
                    return Ok(ConnGuard {
                        conn: Some(pooled.conn),
                        pool: self,
                        _permit: permit,
                    });
                }
                _ => {
                    debug!(address = %self.config.address, "dropping stale pooled connection");
                    // fall through and try the next idle connection
                }
            }
        }

        let conn = self.connect().await?;
        Ok(ConnGuard {
            conn: Some(conn),
            pool: self,
            _permit: permit,
        })
    }

    async fn connect(&self) -> Result<MultiplexedConnection> {
        let mut conn = tokio::time::timeout(
            self.config.connect_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| StratusError::Timeout)?
        .map_err(map_redis_err)?;

        let mut select = redis::cmd("SELECT");
        select.arg(&self.config.namespace);
        if let Some(password) = &self.config.password {
            select.arg(password);
        }
        let selected: redis::RedisResult<()> = tokio::time::timeout(
            self.config.connect_timeout,
            select.query_async(&mut conn),
        )
        .await
        .map_err(|_| StratusError::Timeout)?;
        selected.map_err(|e| {
            StratusError::Network(format!(
                "failed to select namespace {}: {}",
                self.config.namespace, e
            ))
        })?;

        debug!(
            address = %self.config.address,
            namespace = %self.config.namespace,
            "0-db connection established"
        );
        Ok(conn)
    }

    fn clear(&self) {
        self.idle.lock().clear();
    }
}

fn map_redis_err(err: redis::RedisError) -> StratusError {
    let text = err.to_string();
    if text.contains("No space left") {
        StratusError::NamespaceFull
    } else {
        StratusError::Network(text)
    }
}

/// A shard client speaking the 0-db protocol
pub struct ZdbShard {
    pool: ConnectionPool,
    utilization: Mutex<u64>,
}

impl ZdbShard {
    /// Connect to a 0-db shard and bind its namespace.
    ///
    /// The namespace utilization is fetched once here and cached; every
    /// successful put bumps it locally.
    pub async fn connect(config: ZdbConfig) -> Result<Self> {
        if config.address.is_empty() {
            return Err(StratusError::InvalidInput("no shard address given".to_string()));
        }
        if config.namespace.is_empty() {
            return Err(StratusError::InvalidInput("no namespace given".to_string()));
        }

        let client = redis::Client::open(format!("redis://{}", config.address))
            .map_err(map_redis_err)?;
        let shard = Self {
            pool: ConnectionPool::new(client, config),
            utilization: Mutex::new(0),
        };

        let info = shard.namespace_info().await?;
        *shard.utilization.lock() = info.used;
        Ok(shard)
    }

    async fn run<T: redis::FromRedisValue + Send>(
        &self,
        cmd: redis::Cmd,
        timeout: Duration,
    ) -> Result<T> {
        let mut guard = self.pool.acquire().await?;
        match tokio::time::timeout(timeout, cmd.query_async(guard.conn())).await {
            Err(_) => {
                guard.discard();
                Err(StratusError::Timeout)
            }
            Ok(result) => {
                let result: redis::RedisResult<T> = result;
                match result {
                    Ok(value) => Ok(value),
                    Err(err) => {
                        if err.is_io_error() {
                            guard.discard();
                        }
                        Err(map_redis_err(err))
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ShardClient for ZdbShard {
    fn identifier(&self) -> &str {
        &self.pool.config.address
    }

    async fn put_object(&self, data: Bytes) -> Result<ObjectKey> {
        let mut cmd = redis::cmd("SET");
        // empty key: the server derives and returns the content key
        cmd.arg(&b""[..]).arg(data.as_ref());

        let key: Vec<u8> = self.run(cmd, self.pool.config.write_timeout).await?;
        *self.utilization.lock() += data.len() as u64;
        Ok(key)
    }

    async fn get_object(&self, key: &[u8]) -> Result<Bytes> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);

        let data: Option<Vec<u8>> = self.run(cmd, self.pool.config.read_timeout).await?;
        match data {
            Some(data) => Ok(Bytes::from(data)),
            None => Err(StratusError::KeyNotFound),
        }
    }

    async fn delete_object(&self, key: &[u8]) -> Result<()> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);

        // deleting a missing key is not an error
        let _: redis::Value = self.run(cmd, self.pool.config.write_timeout).await?;
        Ok(())
    }

    async fn object_status(&self, key: &[u8]) -> Result<ObjectStatus> {
        let mut cmd = redis::cmd("CHECK");
        cmd.arg(key);

        let status: i64 = self.run(cmd, self.pool.config.read_timeout).await?;
        Ok(match status {
            1 => ObjectStatus::Ok,
            0 => ObjectStatus::Corrupted,
            _ => ObjectStatus::Missing,
        })
    }

    async fn namespace_info(&self) -> Result<NamespaceInfo> {
        let mut cmd = redis::cmd("NSINFO");
        cmd.arg(&self.pool.config.namespace);

        let raw: String = self.run(cmd, self.pool.config.read_timeout).await?;
        parse_namespace_info(&raw)
    }

    fn utilization(&self) -> u64 {
        *self.utilization.lock()
    }

    async fn close(&self) -> Result<()> {
        self.pool.clear();
        Ok(())
    }
}

/// Parse the key:value lines of an NSINFO reply
fn parse_namespace_info(raw: &str) -> Result<NamespaceInfo> {
    let mut info = NamespaceInfo::default();

    let parse = |value: &str| -> Result<i64> {
        value
            .trim()
            .parse::<i64>()
            .map_err(|e| StratusError::Network(format!("malformed NSINFO field: {}", e)))
    };

    for line in raw.split('\n') {
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match field.trim() {
            "name" => info.label = value.to_string(),
            "entries" => info.nr_objects = parse(value)? as u64,
            "data_size_bytes" => info.used = parse(value)? as u64,
            "data_disk_freespace_bytes" => info.free = parse(value)? as u64,
            "stats_index_io_errors" => info.health.index_io_errors = parse(value)?,
            "stats_index_faults" => info.health.index_faults = parse(value)?,
            "stats_data_io_errors" => info.health.data_io_errors = parse(value)?,
            "stats_data_faults" => info.health.data_faults = parse(value)?,
            "stats_index_io_error_last" => info.health.index_io_error_last = parse(value)?,
            "stats_data_io_error_last" => info.health.data_io_error_last = parse(value)?,
            _ => {}
        }
    }

    if info.label.is_empty() {
        warn!("NSINFO reply carried no namespace name");
    }
    Ok(info)
}

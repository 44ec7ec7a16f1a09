// src/core/client/mod.rs

//! The underlying data-store client consumed by the datasource.
//!
//! The supervisor only ever sees the [`Connector`] and [`Connection`] traits;
//! [`RespConnector`] and [`RespClient`] are the production implementation that
//! speaks RESP over a pooled set of sockets.

use crate::config::{RetrySettings, Settings};
use crate::core::DatasourceError;
use crate::core::protocol::RespFrame;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

mod connection;
pub mod pool;
pub mod retry;
mod stream;

use self::pool::ConnectionPool;
pub use self::pool::PoolStats;
use self::retry::backoff_delay;

/// A live connection handle to the store.
#[async_trait]
pub trait Connection: Send + Sync + fmt::Debug {
    /// Issues a single `PING`; succeeds only on `PONG`.
    async fn ping(&self) -> Result<(), DatasourceError>;

    /// Executes one command and returns its reply. Error replies from the
    /// server are returned as [`DatasourceError::Server`].
    async fn execute(&self, args: Vec<Bytes>) -> Result<RespFrame, DatasourceError>;

    /// Releases the underlying resources. Commands issued afterwards fail.
    async fn close(&self);

    /// A loggable identity for the handle (never includes credentials).
    fn identity(&self) -> &str;

    /// Implementation-specific key/value pairs for debug reports.
    fn stats(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

/// A shared reference to the installed connection.
pub type Handle = Arc<dyn Connection>;

/// Builds new connection handles from settings.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, settings: &Settings) -> Result<Handle, DatasourceError>;
}

/// The production connector: a pooled RESP client.
#[derive(Debug, Default, Clone, Copy)]
pub struct RespConnector;

#[async_trait]
impl Connector for RespConnector {
    async fn connect(&self, settings: &Settings) -> Result<Handle, DatasourceError> {
        let handle: Handle = Arc::new(RespClient::connect(settings).await?);
        Ok(handle)
    }
}

/// A pooled RESP client with its own retry policy for transport errors.
pub struct RespClient {
    pool: Arc<ConnectionPool>,
    retry: RetrySettings,
    identity: String,
}

impl fmt::Debug for RespClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RespClient")
            .field("identity", &self.identity)
            .field("pool", &self.pool.stats())
            .finish()
    }
}

impl RespClient {
    pub async fn connect(settings: &Settings) -> Result<Self, DatasourceError> {
        let pool = ConnectionPool::connect(settings).await?;
        Ok(Self {
            pool,
            retry: *settings.retry(),
            identity: settings.redacted_url(),
        })
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Sends a frame on a pooled connection, retrying transport failures up to
    /// `retry.max_retries` times.
    pub async fn query(&self, frame: RespFrame) -> Result<RespFrame, DatasourceError> {
        let mut attempt = 0;
        loop {
            match self.query_once(frame.clone()).await {
                Ok(RespFrame::Error(msg)) => return Err(DatasourceError::Server(msg)),
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = backoff_delay(attempt, &self.retry);
                    debug!(
                        "Command to {} failed ({}); retry {} in {:?}",
                        self.identity,
                        e,
                        attempt + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn query_once(&self, frame: RespFrame) -> Result<RespFrame, DatasourceError> {
        let mut pooled = self.pool.get().await?;
        // A failed exchange drops the connection instead of returning it.
        let reply = pooled.conn.send_and_receive(frame).await?;
        self.pool.put(pooled);
        Ok(reply)
    }
}

#[async_trait]
impl Connection for RespClient {
    async fn ping(&self) -> Result<(), DatasourceError> {
        match self.execute(vec![Bytes::from_static(b"PING")]).await? {
            RespFrame::SimpleString(s) if s.eq_ignore_ascii_case("PONG") => Ok(()),
            other => Err(DatasourceError::Protocol(format!(
                "unexpected PING reply: {other:?}"
            ))),
        }
    }

    async fn execute(&self, args: Vec<Bytes>) -> Result<RespFrame, DatasourceError> {
        self.query(RespFrame::command(args)).await
    }

    async fn close(&self) {
        debug!("Closing client for {}", self.identity);
        self.pool.close();
    }

    fn identity(&self) -> &str {
        &self.identity
    }

    fn stats(&self) -> Vec<(&'static str, String)> {
        let stats = self.pool.stats();
        vec![
            ("pool_size", stats.size.to_string()),
            ("pool_idle", stats.idle.to_string()),
            ("pool_in_use", stats.in_use.to_string()),
        ]
    }
}

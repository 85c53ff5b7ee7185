// Redis connection over the `redis` crate.
//
// The multiplexed connection is established on first use and cached. When a
// command fails because the socket dropped, the cached handle is discarded
// and the command is retried once on a fresh connection. Connecting is bounded
// by `connect_timeout`. Connection failures are reported to the error sink and
// surface as `StoreError::Unavailable`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError, RedisResult};
use tokio::sync::Mutex;

use portal_auth_core::{ErrorReporter, ReportedError, TracingErrorReporter};

use crate::storage::{RedisLikeConnection, StoreError};

/// Default bound on establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct RedisConnection {
    client: redis::Client,
    handle: Mutex<Option<MultiplexedConnection>>,
    reporter: Arc<dyn ErrorReporter>,
    connect_timeout: Duration,
}

impl std::fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnection")
            .field("addr", &self.client.get_connection_info().addr)
            .finish_non_exhaustive()
    }
}

impl RedisConnection {
    /// Prepare a client for `url`. No network I/O happens until the first command.
    pub fn open(url: &str) -> Result<Self, StoreError> {
        Self::with_reporter(url, Arc::new(TracingErrorReporter))
    }

    pub fn with_reporter(url: &str, reporter: Arc<dyn ErrorReporter>) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)
            .map_err(|e| StoreError::Other(format!("invalid cache URL: {e}")))?;
        Ok(Self {
            client,
            handle: Mutex::new(None),
            reporter,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    async fn connection(&self, operation: &'static str) -> Result<MultiplexedConnection, StoreError> {
        let mut guard = self.handle.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let connect = self.client.get_multiplexed_async_connection();
        match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(conn)) => {
                tracing::debug!("cache store connected");
                *guard = Some(conn.clone());
                Ok(conn)
            }
            Ok(Err(e)) => {
                self.report(operation, &e.to_string());
                Err(StoreError::Unavailable(e.to_string()))
            }
            Err(_) => {
                let message = format!("connect timed out after {}ms", self.connect_timeout.as_millis());
                self.report(operation, &message);
                Err(StoreError::Unavailable(message))
            }
        }
    }

    async fn invalidate(&self) {
        self.handle.lock().await.take();
    }

    fn report(&self, operation: &'static str, message: &str) {
        self.reporter.report(
            &ReportedError::new("cache_connection", message).with_tag("operation", operation),
        );
    }

    /// Run one command, reconnecting once if the cached connection has dropped.
    async fn run<T, F, Fut>(&self, operation: &'static str, command: F) -> Result<T, StoreError>
    where
        F: Fn(MultiplexedConnection) -> Fut + Send + Sync,
        Fut: Future<Output = RedisResult<T>> + Send,
        T: Send,
    {
        let conn = self.connection(operation).await?;
        match command(conn).await {
            Ok(value) => Ok(value),
            Err(e) if is_connection_error(&e) => {
                tracing::warn!(operation, error = %e, "cache connection dropped, reconnecting");
                self.invalidate().await;
                let conn = self.connection(operation).await?;
                match command(conn).await {
                    Ok(value) => Ok(value),
                    Err(e) if is_connection_error(&e) => {
                        self.invalidate().await;
                        self.report(operation, &e.to_string());
                        Err(StoreError::Unavailable(e.to_string()))
                    }
                    Err(e) => Err(StoreError::Other(e.to_string())),
                }
            }
            Err(e) => Err(StoreError::Other(e.to_string())),
        }
    }
}

fn is_connection_error(e: &RedisError) -> bool {
    e.is_connection_dropped() || e.is_io_error() || e.is_connection_refusal() || e.is_timeout()
}

#[async_trait]
impl RedisLikeConnection for RedisConnection {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.run("get", |mut conn| async move {
            conn.get::<_, Option<String>>(key).await
        })
        .await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        self.run("set", |mut conn| async move {
            conn.set_ex::<_, _, ()>(key, value, ttl_secs).await
        })
        .await
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let removed: i64 = self
            .run("delete", |mut conn| async move { conn.del::<_, i64>(key).await })
            .await?;
        Ok(removed > 0)
    }

    async fn get_del(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.run("take", |mut conn| async move {
            conn.get_del::<_, Option<String>>(key).await
        })
        .await
    }

    async fn reset(&self) {
        self.invalidate().await;
    }
}

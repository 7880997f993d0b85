//! Redis-backed fixed-window limiter shared across gateway instances.
//!
//! All accounting lives in the store; correctness under concurrency comes
//! from the store's atomic increment. Store failures reject the request.
//!
//! Remaining quota is taken before the current request is counted, so a limit
//! of N admits N requests per minute, the same as the local limiter. Checking
//! the quota left after the increment instead would admit only N-1.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use redis::{aio::ConnectionManager, IntoConnectionInfo};
use tokio::sync::OnceCell;

use crate::config::RedisConfig;

const WINDOW_SECS: u64 = 60;
const KEY_PREFIX: &str = "rate_limit";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit exceeded")]
    Exceeded,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Shared per-minute counter.
#[async_trait]
pub trait RateLimitStore: Send + Sync + fmt::Debug {
    /// Count one request for `key` in the current minute.
    ///
    /// Returns the quota that was left before this request was counted.
    async fn hit(&self, key: &str, limit: u32) -> Result<u32, StoreError>;
}

#[derive(Debug, Clone)]
pub struct DistributedRateLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl DistributedRateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    /// Admit the request unless `client_ip` has no quota left this minute.
    pub async fn allowed(&self, client_ip: &str, limit: u32) -> Result<(), RateLimitError> {
        let remaining = self.store.hit(client_ip, limit).await?;
        if remaining == 0 {
            return Err(RateLimitError::Exceeded);
        }
        Ok(())
    }
}

/// Quota left before the `count`-th request of a window.
pub fn remaining_before(count: u64, limit: u32) -> u32 {
    let used = count.saturating_sub(1);
    u64::from(limit).saturating_sub(used) as u32
}

/// Current fixed window, in minutes since the epoch.
fn current_window() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() / WINDOW_SECS)
        .unwrap_or_default()
}

/// Redis store counting with `INCR` + `EXPIRE` in one transaction.
///
/// The connection is opened on first use so the gateway can start while
/// redis is unreachable. Until a first connect succeeds, every check retries
/// it within `CONNECT_TIMEOUT`.
pub struct RedisStore {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("addr", &self.client.get_connection_info().addr)
            .field("connected", &self.connection.initialized())
            .finish()
    }
}

impl RedisStore {
    pub fn open(config: &RedisConfig) -> Result<Self, StoreError> {
        let mut info = config.url.as_str().into_connection_info()?;
        if let Some(password) = &config.password {
            info.redis.password = Some(password.clone());
        }
        Ok(Self {
            client: redis::Client::open(info)?,
            connection: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                match tokio::time::timeout(
                    CONNECT_TIMEOUT,
                    ConnectionManager::new(self.client.clone()),
                )
                .await
                {
                    Ok(result) => result.map_err(StoreError::from),
                    Err(_) => Err(StoreError::Unavailable(
                        "timed out connecting to redis".into(),
                    )),
                }
            })
            .await?;
        Ok(connection.clone())
    }
}

#[async_trait]
impl RateLimitStore for RedisStore {
    async fn hit(&self, key: &str, limit: u32) -> Result<u32, StoreError> {
        let key = format!("{KEY_PREFIX}:{key}:{}", current_window());
        let mut connection = self.connection().await?;
        let (count, _): (u64, i64) = redis::pipe()
            .atomic()
            .incr(&key, 1u64)
            .expire(&key, WINDOW_SECS as _)
            .query_async(&mut connection)
            .await?;
        Ok(remaining_before(count, limit))
    }
}

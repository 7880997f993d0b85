//! Gateway startup and reload errors.

use thiserror::Error;

use crate::config::ConfigError;
use crate::security::rate_limit::StoreError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build auth client: {0}")]
    AuthClient(#[from] reqwest::Error),

    #[error("rate limit store error: {0}")]
    Store(#[from] StoreError),

    #[error("a redis-backed rate limiter is configured but no redis store was opened")]
    MissingStore,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

//! Rate limiting middleware.
//!
//! # Modes
//! - Local: per-process fixed window per client IP (`local.rs`)
//! - Distributed: per-minute window counted in redis (`distributed.rs`)
//!
//! # Design Decisions
//! - Both modes answer `429` with the same envelope
//! - The distributed mode fails closed: a store error rejects the request
//! - The local mode has no external dependency to fail

pub mod distributed;
pub mod local;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::http::request::{client_ip, user_agent};
use crate::http::response::ErrorResponder;

pub use distributed::{
    DistributedRateLimiter, RateLimitError, RateLimitStore, RedisStore, StoreError,
};
pub use local::LocalRateLimiter;

/// Where request counts are kept.
#[derive(Debug)]
pub enum LimiterMode {
    Local(LocalRateLimiter),
    Distributed(DistributedRateLimiter),
}

/// A rate limiter with its rejection rendering.
#[derive(Debug)]
pub struct RateLimiter {
    requests: u32,
    mode: LimiterMode,
    responder: ErrorResponder,
}

impl RateLimiter {
    pub fn local(requests: u32, window: Duration, responder: ErrorResponder) -> Self {
        Self {
            requests,
            mode: LimiterMode::Local(LocalRateLimiter::new(requests, window)),
            responder,
        }
    }

    pub fn distributed(
        requests: u32,
        store: Arc<dyn RateLimitStore>,
        responder: ErrorResponder,
    ) -> Self {
        Self {
            requests,
            mode: LimiterMode::Distributed(DistributedRateLimiter::new(store)),
            responder,
        }
    }

    pub fn mode(&self) -> &LimiterMode {
        &self.mode
    }

    pub fn is_distributed(&self) -> bool {
        matches!(self.mode, LimiterMode::Distributed(_))
    }

    /// Count a request from `client_ip` and decide whether it may proceed.
    pub async fn admit(&self, client_ip: &str) -> bool {
        match &self.mode {
            LimiterMode::Local(limiter) => limiter.allowed(client_ip),
            LimiterMode::Distributed(limiter) => {
                match limiter.allowed(client_ip, self.requests).await {
                    Ok(()) => true,
                    Err(RateLimitError::Exceeded) => false,
                    Err(RateLimitError::Store(e)) => {
                        tracing::error!(client_ip = %client_ip, error = %e, "Redis rate limiter error");
                        false
                    }
                }
            }
        }
    }

    /// Drop expired local entries. Distributed limiters keep no local state.
    pub fn sweep(&self) -> usize {
        match &self.mode {
            LimiterMode::Local(limiter) => limiter.sweep_expired(),
            LimiterMode::Distributed(_) => 0,
        }
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client_ip = client_ip(&request);
    tracing::debug!(client_ip = %client_ip, redis_based = limiter.is_distributed(), "Rate limiter check");

    if limiter.admit(&client_ip).await {
        next.run(request).await
    } else {
        tracing::error!(
            client_ip = %client_ip,
            uri = %request.uri(),
            user_agent = %user_agent(&request),
            "Too many requests"
        );
        limiter.responder.too_many_requests(request.headers())
    }
}

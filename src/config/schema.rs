//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Redis connection used by redis-backed rate limiters.
    pub redis: RedisConfig,

    /// Gateway-wide CORS allow-list.
    pub cors: CorsConfig,

    /// Gateway-wide rate limiter applied to every route.
    pub rate_limit: RateLimitConfig,

    /// Optional override of the default JSON error body.
    pub error_interceptor: Option<ErrorInterceptorConfig>,

    /// Named middlewares that routes can reference.
    pub middlewares: Vec<MiddlewareConfig>,

    /// Route definitions mapping requests to backends.
    pub routes: Vec<RouteConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Security hardening settings.
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Deadline for the outbound call to a delegated auth server in seconds.
    pub auth_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            auth_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RedisConfig {
    /// Connection URL, e.g. "redis://127.0.0.1:6379".
    pub url: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins. `*` allows any origin.
    pub origins: Vec<String>,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per window and client IP. Zero disables the limiter.
    pub requests: u32,

    /// Window length in seconds. Redis-backed limiters always count per minute.
    pub window_secs: u64,

    /// Count in redis so the limit is shared across gateway instances.
    pub redis_based: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: 0,
            window_secs: 60,
            redis_based: false,
        }
    }
}

impl RateLimitConfig {
    pub fn enabled(&self) -> bool {
        self.requests > 0
    }
}

/// Replaces the default JSON error envelope.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ErrorInterceptorConfig {
    pub content_type: String,

    /// Body template; `{code}` and `{message}` are substituted.
    pub body: String,

    /// Status codes to intercept. Empty intercepts every error.
    pub status_codes: Vec<u16>,
}

impl Default for ErrorInterceptorConfig {
    fn default() -> Self {
        Self {
            content_type: "text/plain; charset=utf-8".to_string(),
            body: "{code} {message}".to_string(),
            status_codes: Vec::new(),
        }
    }
}

/// A named middleware definition.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MiddlewareConfig {
    /// Name routes use to reference this middleware.
    pub name: String,

    #[serde(flatten)]
    pub kind: MiddlewareKind,
}

/// The closed set of middleware kinds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MiddlewareKind {
    /// Static username/password pair.
    Basic(BasicAuthConfig),
    /// Delegated verification against an auth server.
    Jwt(JwtAuthConfig),
    /// Per-route rate limiter.
    RateLimit(RateLimitConfig),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BasicAuthConfig {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct JwtAuthConfig {
    /// Headers that must be present before the auth server is called.
    pub required_headers: Vec<String>,

    /// Auth server URL, called with `GET`.
    pub url: String,

    /// Auth response header -> downstream request header.
    pub headers: BTreeMap<String, String>,

    /// Auth response header -> downstream query parameter.
    pub params: BTreeMap<String, String>,
}

/// Route configuration mapping requests to backends.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging.
    pub name: String,

    /// Path prefix to match. Unique within the route set.
    pub path: String,

    /// Host headers to match (exact, case-insensitive). Empty matches any host.
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Backend base URLs, selected round-robin.
    pub backends: Vec<String>,

    /// Names of middlewares to run, in order.
    #[serde(default)]
    pub middlewares: Vec<String>,

    /// Route-specific CORS origins, falling back to the gateway-wide list.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

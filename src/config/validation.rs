//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing middlewares)
//! - Validate value ranges (limits >= 1, windows > 0, timeouts > 0)
//! - Detect conflicting routes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - The delegated auth URL is checked per request, not here

use std::collections::HashSet;

use axum::http::HeaderName;
use url::Url;

use crate::config::schema::{GatewayConfig, MiddlewareKind, RateLimitConfig};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("duplicate route path `{0}`")]
    DuplicateRoutePath(String),
    #[error("route `{0}` has no backends")]
    NoBackends(String),
    #[error("route `{route}` has invalid backend `{backend}`")]
    InvalidBackend { route: String, backend: String },
    #[error("route `{route}` references unknown middleware `{middleware}`")]
    UnknownMiddleware { route: String, middleware: String },
    #[error("duplicate middleware name `{0}`")]
    DuplicateMiddleware(String),
    #[error("middleware `{0}` needs a non-empty username and password")]
    EmptyCredentials(String),
    #[error("rate limiter `{0}` needs requests >= 1 and window_secs > 0")]
    InvalidRateLimit(String),
    #[error("middleware `{middleware}` has invalid header name `{header}`")]
    InvalidHeaderName { middleware: String, header: String },
    #[error("redis-backed rate limiting needs redis.url")]
    MissingRedisUrl,
    #[error("timeout `{0}` must be greater than zero")]
    InvalidTimeout(&'static str),
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::InvalidTimeout("request_secs"));
    }
    if config.timeouts.auth_secs == 0 {
        errors.push(ValidationError::InvalidTimeout("auth_secs"));
    }

    let mut redis_needed = config.rate_limit.enabled() && config.rate_limit.redis_based;

    if config.rate_limit.enabled() && config.rate_limit.window_secs == 0 {
        errors.push(ValidationError::InvalidRateLimit("gateway".to_string()));
    }

    let mut names = HashSet::new();
    for middleware in &config.middlewares {
        if !names.insert(middleware.name.as_str()) {
            errors.push(ValidationError::DuplicateMiddleware(middleware.name.clone()));
        }
        match &middleware.kind {
            MiddlewareKind::Basic(basic) => {
                if basic.username.is_empty() || basic.password.is_empty() {
                    errors.push(ValidationError::EmptyCredentials(middleware.name.clone()));
                }
            }
            MiddlewareKind::Jwt(jwt) => {
                let copied = jwt
                    .required_headers
                    .iter()
                    .chain(jwt.headers.keys())
                    .chain(jwt.headers.values())
                    .chain(jwt.params.keys());
                for header in copied {
                    if HeaderName::from_bytes(header.as_bytes()).is_err() {
                        errors.push(ValidationError::InvalidHeaderName {
                            middleware: middleware.name.clone(),
                            header: header.clone(),
                        });
                    }
                }
            }
            MiddlewareKind::RateLimit(rl) => {
                if !valid_limit(rl) {
                    errors.push(ValidationError::InvalidRateLimit(middleware.name.clone()));
                }
                redis_needed |= rl.redis_based;
            }
        }
    }

    let mut paths = HashSet::new();
    for route in &config.routes {
        if !paths.insert(route.path.as_str()) {
            errors.push(ValidationError::DuplicateRoutePath(route.path.clone()));
        }
        if route.backends.is_empty() {
            errors.push(ValidationError::NoBackends(route.name.clone()));
        }
        for backend in &route.backends {
            let valid = Url::parse(backend)
                .map(|url| url.scheme() == "http" && url.has_host())
                .unwrap_or(false);
            if !valid {
                errors.push(ValidationError::InvalidBackend {
                    route: route.name.clone(),
                    backend: backend.clone(),
                });
            }
        }
        for name in &route.middlewares {
            if !names.contains(name.as_str()) {
                errors.push(ValidationError::UnknownMiddleware {
                    route: route.name.clone(),
                    middleware: name.clone(),
                });
            }
        }
    }

    if redis_needed && config.redis.url.is_empty() {
        errors.push(ValidationError::MissingRedisUrl);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn valid_limit(config: &RateLimitConfig) -> bool {
    config.requests >= 1 && config.window_secs > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{BasicAuthConfig, MiddlewareConfig, RouteConfig};

    fn route(name: &str, path: &str) -> RouteConfig {
        RouteConfig {
            name: name.into(),
            path: path.into(),
            hosts: Vec::new(),
            backends: vec!["http://127.0.0.1:3000".into()],
            middlewares: Vec::new(),
            cors_origins: Vec::new(),
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = GatewayConfig::default();
        config.middlewares.push(MiddlewareConfig {
            name: "admin".into(),
            kind: MiddlewareKind::Basic(BasicAuthConfig {
                username: "".into(),
                password: "pw".into(),
            }),
        });
        config.middlewares.push(MiddlewareConfig {
            name: "limit".into(),
            kind: MiddlewareKind::RateLimit(RateLimitConfig {
                requests: 0,
                window_secs: 60,
                redis_based: true,
            }),
        });
        let mut api = route("api", "/api");
        api.middlewares = vec!["admin".into(), "missing".into()];
        let mut dup = route("api2", "/api");
        dup.backends = vec!["not a url".into()];
        config.routes = vec![api, dup];

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::EmptyCredentials("admin".into())));
        assert!(errors.contains(&ValidationError::InvalidRateLimit("limit".into())));
        assert!(errors.contains(&ValidationError::DuplicateRoutePath("/api".into())));
        assert!(errors.contains(&ValidationError::UnknownMiddleware {
            route: "api".into(),
            middleware: "missing".into(),
        }));
        assert!(errors.contains(&ValidationError::InvalidBackend {
            route: "api2".into(),
            backend: "not a url".into(),
        }));
        assert!(errors.contains(&ValidationError::MissingRedisUrl));
    }

    #[test]
    fn backends_must_be_plain_http() {
        let mut config = GatewayConfig::default();
        let mut tls = route("tls", "/tls");
        tls.backends = vec!["https://backend.internal".into()];
        config.routes = vec![route("ok", "/ok"), tls];

        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::InvalidBackend {
                route: "tls".into(),
                backend: "https://backend.internal".into(),
            }]
        );
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let mut config = GatewayConfig::default();
        config.timeouts.request_secs = 0;
        config.timeouts.auth_secs = 0;

        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![
                ValidationError::InvalidTimeout("request_secs"),
                ValidationError::InvalidTimeout("auth_secs"),
            ]
        );

        config.timeouts.request_secs = 1;
        config.timeouts.auth_secs = 1;
        assert_eq!(validate_config(&config), Ok(()));
    }
}

//! Route compilation.
//!
//! Turns route and middleware configuration into a `RouteTable`: each route
//! gets its proxy handler wrapped in its gates.
//!
//! # Gate order on a route
//! ```text
//! auth gates (config order) → route rate limiters (config order)
//!     → gateway-wide rate limiter → proxy handler
//! ```
//!
//! Auth runs first so unauthenticated traffic never consumes rate-limit quota.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use url::Url;

use crate::config::{
    validate_config, ConfigError, GatewayConfig, MiddlewareConfig, MiddlewareKind,
    RateLimitConfig, RouteConfig, ValidationError,
};
use crate::error::GatewayError;
use crate::http::proxy::{proxy_handler, upstream_client, ProxyTarget, UpstreamClient};
use crate::http::response::{ErrorResponder, SharedInterceptor, TemplateInterceptor};
use crate::load_balancer::RoundRobin;
use crate::routing::matcher::{HostMatcher, PathPrefixMatcher, RouteMatcher};
use crate::routing::router::{Route, RouteTable};
use crate::security::basic_auth::BasicAuth;
use crate::security::delegated_auth::DelegatedAuth;
use crate::security::rate_limit::{RateLimitStore, RateLimiter, RedisStore};
use crate::security::{wrap_all, AuthGate, RouteGate};

/// Long-lived pieces shared by every build of the route table.
#[derive(Debug, Clone)]
pub struct RouteBuilder {
    auth_client: reqwest::Client,
    store: Option<Arc<dyn RateLimitStore>>,
    global_limiter: Option<Arc<RateLimiter>>,
    interceptor: Option<SharedInterceptor>,
    selector: Arc<RoundRobin>,
    upstream: UpstreamClient,
}

fn needs_store(config: &GatewayConfig) -> bool {
    let global = config.rate_limit.enabled() && config.rate_limit.redis_based;
    global
        || config.middlewares.iter().any(|m| {
            matches!(&m.kind, MiddlewareKind::RateLimit(rl) if rl.redis_based)
        })
}

impl RouteBuilder {
    /// Create the shared pieces from the startup configuration.
    ///
    /// The redis store is opened only when some limiter is redis-backed; it
    /// connects lazily, so an unreachable redis does not fail startup.
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let store: Option<Arc<dyn RateLimitStore>> = if needs_store(config) {
            Some(Arc::new(RedisStore::open(&config.redis)?))
        } else {
            None
        };
        Self::with_store(config, store)
    }

    /// Like `new`, with an explicit store for redis-backed limiters.
    pub fn with_store(
        config: &GatewayConfig,
        store: Option<Arc<dyn RateLimitStore>>,
    ) -> Result<Self, GatewayError> {
        validate_config(config).map_err(ConfigError::Validation)?;
        let auth_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.auth_secs))
            .build()?;
        let interceptor = config
            .error_interceptor
            .as_ref()
            .map(|c| Arc::new(TemplateInterceptor::from_config(c)) as SharedInterceptor);

        let mut builder = Self {
            auth_client,
            store,
            global_limiter: None,
            interceptor,
            selector: Arc::new(RoundRobin::new()),
            upstream: upstream_client(),
        };

        if config.rate_limit.enabled() {
            let responder = builder.responder(config.cors.origins.clone());
            let limiter = builder.limiter(&config.rate_limit, responder)?;
            tracing::info!(
                requests = config.rate_limit.requests,
                window_secs = config.rate_limit.window_secs,
                redis_based = config.rate_limit.redis_based,
                "Gateway rate limiter enabled"
            );
            builder.global_limiter = Some(Arc::new(limiter));
        }

        Ok(builder)
    }

    /// The gateway-wide limiter, if enabled. It is kept across reloads.
    pub fn global_limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.global_limiter.as_ref()
    }

    fn responder(&self, origins: Vec<String>) -> ErrorResponder {
        ErrorResponder::new(origins, self.interceptor.clone())
    }

    fn limiter(
        &self,
        config: &RateLimitConfig,
        responder: ErrorResponder,
    ) -> Result<RateLimiter, GatewayError> {
        if config.redis_based {
            let store = self.store.clone().ok_or(GatewayError::MissingStore)?;
            Ok(RateLimiter::distributed(config.requests, store, responder))
        } else {
            Ok(RateLimiter::local(
                config.requests,
                Duration::from_secs(config.window_secs),
                responder,
            ))
        }
    }

    /// Compile `config` into a route table.
    pub fn build(&self, config: &GatewayConfig) -> Result<RouteTable, GatewayError> {
        validate_config(config).map_err(ConfigError::Validation)?;

        let middlewares: HashMap<&str, &MiddlewareConfig> = config
            .middlewares
            .iter()
            .map(|m| (m.name.as_str(), m))
            .collect();

        let routes = config
            .routes
            .iter()
            .map(|route| self.build_route(config, route, &middlewares))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RouteTable::new(routes))
    }

    fn build_route(
        &self,
        config: &GatewayConfig,
        route: &RouteConfig,
        middlewares: &HashMap<&str, &MiddlewareConfig>,
    ) -> Result<Route, GatewayError> {
        let origins = if route.cors_origins.is_empty() {
            config.cors.origins.clone()
        } else {
            route.cors_origins.clone()
        };

        let mut gates = Vec::with_capacity(route.middlewares.len() + 1);
        let mut limiters = Vec::new();
        for name in &route.middlewares {
            let middleware = middlewares.get(name.as_str()).ok_or_else(|| {
                invalid(ValidationError::UnknownMiddleware {
                    route: route.name.clone(),
                    middleware: name.clone(),
                })
            })?;
            let responder = self.responder(origins.clone());
            let gate = match &middleware.kind {
                MiddlewareKind::Basic(basic) => {
                    RouteGate::Auth(AuthGate::Basic(Arc::new(BasicAuth::new(basic, responder))))
                }
                MiddlewareKind::Jwt(jwt) => RouteGate::Auth(AuthGate::Delegated(Arc::new(
                    DelegatedAuth::new(jwt, self.auth_client.clone(), responder),
                ))),
                MiddlewareKind::RateLimit(rl) => {
                    let limiter = Arc::new(self.limiter(rl, responder)?);
                    limiters.push(limiter.clone());
                    RouteGate::RateLimit(limiter)
                }
            };
            gates.push((gate, name.clone()));
        }
        // Stable: config order is kept within each group.
        gates.sort_by_key(|(gate, _)| !gate.is_auth());
        let (mut gates, mut names): (Vec<RouteGate>, Vec<String>) = gates.into_iter().unzip();
        if let Some(limiter) = &self.global_limiter {
            gates.push(RouteGate::RateLimit(limiter.clone()));
            names.push("gateway_rate_limit".to_string());
        }

        let backends = route
            .backends
            .iter()
            .map(|backend| {
                Url::parse(backend).map_err(|_| {
                    invalid(ValidationError::InvalidBackend {
                        route: route.name.clone(),
                        backend: backend.clone(),
                    })
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let backends: Arc<[Url]> = backends.into();

        let target = ProxyTarget {
            route: route.name.as_str().into(),
            backends: backends.clone(),
            selector: self.selector.clone(),
            client: self.upstream.clone(),
            interceptor: self.interceptor.clone(),
        };
        let service = wrap_all(Router::new().fallback(proxy_handler).with_state(target), &gates);

        tracing::debug!(route = %route.name, path = %route.path, gates = ?names, "Route compiled");

        Ok(Route {
            name: route.name.clone(),
            matcher: RouteMatcher {
                path: PathPrefixMatcher::new(route.path.clone()),
                host: HostMatcher::new(&route.hosts),
            },
            backends,
            gates: names,
            limiters,
            service,
        })
    }
}

fn invalid(error: ValidationError) -> GatewayError {
    GatewayError::Config(ConfigError::Validation(vec![error]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::security::rate_limit::distributed::tests::MemoryStore;

    const CONFIG: &str = r#"
        [rate_limit]
        requests = 100

        [[middlewares]]
        name = "burst"
        type = "rate_limit"
        requests = 5

        [[middlewares]]
        name = "admin"
        type = "basic"
        username = "admin"
        password = "secret"

        [[middlewares]]
        name = "jwt"
        type = "jwt"
        url = "http://127.0.0.1:9/verify"
        required_headers = ["Authorization"]

        [[routes]]
        name = "api"
        path = "/api"
        backends = ["http://127.0.0.1:3000"]
        middlewares = ["burst", "admin", "jwt"]

        [[routes]]
        name = "web"
        path = "/"
        backends = ["http://127.0.0.1:3001", "http://127.0.0.1:3002/app"]
    "#;

    #[test]
    fn auth_gates_run_before_rate_limits() {
        let config = parse_config(CONFIG).unwrap();
        let table = RouteBuilder::new(&config).unwrap().build(&config).unwrap();

        let api = &table.routes()[0];
        assert_eq!(api.name, "api");
        assert_eq!(api.gates, vec!["admin", "jwt", "burst", "gateway_rate_limit"]);

        let web = &table.routes()[1];
        assert_eq!(web.gates, vec!["gateway_rate_limit"]);
        assert_eq!(web.backends.len(), 2);
    }

    #[test]
    fn redis_limiter_needs_a_store() {
        let mut config = parse_config(CONFIG).unwrap();
        config.redis.url = "redis://127.0.0.1:6379".into();
        config.rate_limit.redis_based = true;

        let builder = RouteBuilder::with_store(&config, None);
        assert!(matches!(builder, Err(GatewayError::MissingStore)));

        let store: Arc<dyn RateLimitStore> = Arc::new(MemoryStore::default());
        let builder = RouteBuilder::with_store(&config, Some(store)).unwrap();
        assert!(builder.global_limiter().unwrap().is_distributed());
        assert_eq!(builder.build(&config).unwrap().len(), 2);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = parse_config(CONFIG).unwrap();
        let builder = RouteBuilder::new(&config).unwrap();

        let mut broken = config.clone();
        broken.routes[0].middlewares.push("missing".into());
        assert!(matches!(
            builder.build(&broken),
            Err(GatewayError::Config(ConfigError::Validation(_)))
        ));
    }

    #[test]
    fn zero_auth_timeout_never_reaches_the_client() {
        let mut config = parse_config(CONFIG).unwrap();
        config.timeouts.auth_secs = 0;

        assert!(matches!(
            RouteBuilder::new(&config),
            Err(GatewayError::Config(ConfigError::Validation(errors)))
                if errors == vec![ValidationError::InvalidTimeout("auth_secs")]
        ));
    }
}

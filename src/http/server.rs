//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the dispatch handler
//! - Wire up middleware (tracing, limits, request ID, timeout)
//! - Bind server to listener
//! - Dispatch requests to the matched route's gated service
//! - Apply config reloads by swapping the route table
//! - Sweep expired local rate-limit entries

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceExt;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::request::{client_ip, user_agent};
use crate::http::response::{respond, SharedInterceptor, TemplateInterceptor};
use crate::routing::{DynamicRouteTable, RouteBuilder};

/// Application state injected into the dispatch handler.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<DynamicRouteTable>,
    pub interceptor: Option<SharedInterceptor>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    routes: Arc<DynamicRouteTable>,
    builder: RouteBuilder,
    sweep_interval: Duration,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let builder = RouteBuilder::new(config)?;
        Self::with_builder(config, builder)
    }

    /// Create a server around an existing route builder.
    pub fn with_builder(config: &GatewayConfig, builder: RouteBuilder) -> Result<Self, GatewayError> {
        let routes = Arc::new(DynamicRouteTable::new(builder.build(config)?));
        let state = AppState {
            routes: routes.clone(),
            interceptor: config
                .error_interceptor
                .as_ref()
                .map(|c| Arc::new(TemplateInterceptor::from_config(c)) as SharedInterceptor),
        };

        let router = Self::build_router(config, state);
        Ok(Self {
            router,
            routes,
            builder,
            sweep_interval: Duration::from_secs(config.rate_limit.window_secs.max(1)),
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .fallback(dispatch_handler)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The live route table.
    pub fn routes(&self) -> Arc<DynamicRouteTable> {
        self.routes.clone()
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Validated configs arriving on `config_updates` replace the routes.
    /// The server drains and returns once `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: Option<mpsc::UnboundedReceiver<GatewayConfig>>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, routes = self.routes.snapshot().len(), "HTTP server starting");

        if let Some(updates) = config_updates {
            tokio::spawn(apply_reloads(
                self.builder.clone(),
                self.routes.clone(),
                updates,
                shutdown.resubscribe(),
            ));
        }
        tokio::spawn(sweep_limiters(
            self.builder.clone(),
            self.routes.clone(),
            self.sweep_interval,
            shutdown.resubscribe(),
        ));

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Rebuild the route table from `config` and swap it in.
pub fn reload(
    builder: &RouteBuilder,
    routes: &DynamicRouteTable,
    config: &GatewayConfig,
) -> Result<(), GatewayError> {
    let table = builder.build(config)?;
    routes.replace(table);
    Ok(())
}

async fn apply_reloads(
    builder: RouteBuilder,
    routes: Arc<DynamicRouteTable>,
    mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else { break };
                if let Err(e) = reload(&builder, &routes, &config) {
                    tracing::error!(error = %e, "Failed to apply config reload, keeping current routes");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

async fn sweep_limiters(
    builder: RouteBuilder,
    routes: Arc<DynamicRouteTable>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let table = routes.snapshot();
                let removed: usize = builder
                    .global_limiter()
                    .into_iter()
                    .chain(table.routes().iter().flat_map(|route| route.limiters.iter()))
                    .map(|limiter| limiter.sweep())
                    .sum();
                if removed > 0 {
                    tracing::debug!(removed, "Swept expired rate limit entries");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

/// Look up the route and hand the request to its gated service.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let table = state.routes.snapshot();
    let Some(route) = table.match_request(&request) else {
        tracing::warn!(
            client_ip = %client_ip(&request),
            method = %request.method(),
            uri = %request.uri(),
            user_agent = %user_agent(&request),
            "No route matched"
        );
        return respond(
            StatusCode::NOT_FOUND,
            "No matching route found",
            state.interceptor.as_deref(),
        );
    };

    tracing::debug!(route = %route.name, method = %request.method(), uri = %request.uri(), "Route matched");

    match route.service.clone().oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    const CONFIG: &str = r#"
        [[middlewares]]
        name = "admin"
        type = "basic"
        username = "admin"
        password = "secret"

        [[routes]]
        name = "admin"
        path = "/admin"
        backends = ["http://127.0.0.1:9"]
        middlewares = ["admin"]
    "#;

    fn request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn unmatched_path_is_not_found() {
        let server = HttpServer::new(&parse_config(CONFIG).unwrap()).unwrap();
        let response = server.router.clone().oneshot(request("/public")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(
            body_string(response).await,
            r#"{"success":false,"code":404,"message":"No matching route found"}"#
        );
    }

    #[tokio::test]
    async fn matched_route_runs_its_gates() {
        let server = HttpServer::new(&parse_config(CONFIG).unwrap()).unwrap();
        let response = server.router.clone().oneshot(request("/admin/panel")).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key("www-authenticate"));
    }

    #[tokio::test]
    async fn reload_swaps_routes() {
        let config = parse_config(CONFIG).unwrap();
        let server = HttpServer::new(&config).unwrap();

        let mut next = config.clone();
        next.routes[0].path = "/private".into();
        reload(&server.builder, &server.routes, &next).unwrap();

        let response = server.router.clone().oneshot(request("/admin")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = server.router.clone().oneshot(request("/private")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // An invalid config leaves the current table in place.
        let mut broken = next.clone();
        broken.routes[0].middlewares = vec!["missing".into()];
        assert!(reload(&server.builder, &server.routes, &broken).is_err());
        let response = server.router.clone().oneshot(request("/private")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

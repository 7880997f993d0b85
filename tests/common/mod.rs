//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use edge_gateway::config::GatewayConfig;
use edge_gateway::{HttpServer, Shutdown};

/// What a mock backend saw.
#[derive(Debug, Serialize, Deserialize)]
pub struct Echo {
    pub tag: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: BTreeMap<String, String>,
}

pub struct MockBackend {
    pub url: String,
    pub hits: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Start a backend that answers every request with an `Echo` of it.
pub async fn start_echo_backend(tag: &'static str) -> MockBackend {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().fallback(move |req: Request<Body>| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            let headers = req
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                .collect();
            Json(Echo {
                tag: tag.to_string(),
                path: req.uri().path().to_string(),
                query: req.uri().query().map(str::to_string),
                headers,
            })
        }
    });
    let addr = serve(app).await;
    MockBackend {
        url: format!("http://{addr}"),
        hits,
    }
}

/// Start an auth server at `/verify` that admits `Authorization: Bearer <token>`
/// and answers with `X-User-Id: 42` and `X-Tenant: acme`.
pub async fn start_auth_server(token: &'static str) -> String {
    let app = Router::new().route(
        "/verify",
        get(move |headers: HeaderMap| async move {
            let expected = format!("Bearer {token}");
            let authorized = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(|v| v == expected)
                .unwrap_or(false);
            if authorized {
                ([("X-User-Id", "42"), ("X-Tenant", "acme")], "ok").into_response()
            } else {
                StatusCode::FORBIDDEN.into_response()
            }
        }),
    );
    let addr = serve(app).await;
    format!("http://{addr}/verify")
}

pub struct Gateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub updates: mpsc::UnboundedSender<GatewayConfig>,
}

impl Gateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Run a gateway for `config` on an ephemeral port.
pub async fn spawn_gateway(config: GatewayConfig) -> Gateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let (updates, config_updates) = mpsc::unbounded_channel();

    let server = HttpServer::new(&config).unwrap();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, Some(config_updates), server_shutdown).await;
    });

    Gateway {
        addr,
        shutdown,
        updates,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

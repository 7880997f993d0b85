//! Upstream forwarding.
//!
//! # Responsibilities
//! - Pick a backend for the matched route (round robin)
//! - Rewrite the request URI onto the backend
//! - Set `X-Forwarded-*` headers
//! - Stream the backend response back
//!
//! # Design Decisions
//! - The request path is forwarded unchanged, appended to the backend base path
//! - No retries: a transport failure is a 502 for the client

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, uri::InvalidUri, HeaderValue, Request, StatusCode, Uri, Version},
    response::{IntoResponse, Response},
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::{Position, Url};

use crate::http::request::X_FORWARDED_FOR;
use crate::http::response::{respond, SharedInterceptor};
use crate::load_balancer::RoundRobin;

pub type UpstreamClient = Client<HttpConnector, Body>;

pub fn upstream_client() -> UpstreamClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

static X_FORWARDED_HOST: header::HeaderName = header::HeaderName::from_static("x-forwarded-host");
static X_FORWARDED_PROTO: header::HeaderName = header::HeaderName::from_static("x-forwarded-proto");

/// Everything the proxy handler needs for one route.
#[derive(Debug, Clone)]
pub struct ProxyTarget {
    pub route: Arc<str>,
    pub backends: Arc<[Url]>,
    pub selector: Arc<RoundRobin>,
    pub client: UpstreamClient,
    pub interceptor: Option<SharedInterceptor>,
}

/// Build the backend URI: backend origin + backend base path + request path and query.
pub fn upstream_uri(backend: &Url, uri: &Uri) -> Result<Uri, InvalidUri> {
    let origin = &backend[..Position::AfterPort];
    let base = backend.path().trim_end_matches('/');
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("{origin}{base}{path_and_query}").parse()
}

fn forwarded_for<B>(request: &Request<B>) -> Option<HeaderValue> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let existing = request
        .headers()
        .get(&X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok());
    let value = match (existing, peer) {
        (Some(existing), Some(peer)) => format!("{existing}, {peer}"),
        (Some(existing), None) => existing.to_string(),
        (None, Some(peer)) => peer,
        (None, None) => return None,
    };
    HeaderValue::from_str(&value).ok()
}

/// Forward the request to the next backend of the route.
pub async fn proxy_handler(State(target): State<ProxyTarget>, request: Request<Body>) -> Response {
    let Some(backend) = target.selector.select(&target.backends) else {
        tracing::warn!(route = %target.route, "Route has no backends");
        return respond(
            StatusCode::SERVICE_UNAVAILABLE,
            "No backend available",
            target.interceptor.as_deref(),
        );
    };

    let uri = match upstream_uri(backend, request.uri()) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(route = %target.route, backend = %backend, error = %e, "Failed to build upstream URI");
            return respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                target.interceptor.as_deref(),
            );
        }
    };

    let forwarded_for = forwarded_for(&request);
    let (mut parts, body) = request.into_parts();
    let original_host = parts.headers.remove(header::HOST);

    if let Some(value) = forwarded_for {
        parts.headers.insert(X_FORWARDED_FOR.clone(), value);
    }
    if let Some(host) = original_host {
        parts.headers.insert(X_FORWARDED_HOST.clone(), host);
    }
    parts
        .headers
        .insert(X_FORWARDED_PROTO.clone(), HeaderValue::from_static("http"));

    tracing::debug!(route = %target.route, backend = %backend, uri = %uri, "Proxying request");

    parts.uri = uri;
    parts.version = Version::HTTP_11;
    let upstream_request = Request::from_parts(parts, body);

    match target.client.request(upstream_request).await {
        Ok(response) => {
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body)).into_response()
        }
        Err(e) => {
            tracing::error!(route = %target.route, backend = %backend, error = %e, "Upstream error");
            respond(
                StatusCode::BAD_GATEWAY,
                "Bad Gateway",
                target.interceptor.as_deref(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    #[test]
    fn joins_backend_base_path() {
        let backend = Url::parse("http://127.0.0.1:3000/base/").unwrap();
        let uri: Uri = "/users/7?x=1".parse().unwrap();
        assert_eq!(
            upstream_uri(&backend, &uri).unwrap(),
            "http://127.0.0.1:3000/base/users/7?x=1"
        );

        let backend = Url::parse("http://svc.internal").unwrap();
        assert_eq!(
            upstream_uri(&backend, &uri).unwrap(),
            "http://svc.internal/users/7?x=1"
        );
    }

    #[test]
    fn appends_peer_to_forwarded_for() {
        let peer: SocketAddr = "10.0.0.9:5555".parse().unwrap();
        let mut request = Request::builder()
            .header("X-Forwarded-For", "1.2.3.4")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        assert_eq!(forwarded_for(&request).unwrap(), "1.2.3.4, 10.0.0.9");

        let request = Request::builder().body(Body::empty()).unwrap();
        assert!(forwarded_for(&request).is_none());
    }

    async fn echo_backend(tag: &'static str) -> Url {
        let app = Router::new().fallback(move |req: Request<Body>| async move {
            let host = req
                .headers()
                .get("x-forwarded-host")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            format!("{tag} {} {host}", req.uri().path())
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{addr}")).unwrap()
    }

    fn target(backends: Vec<Url>) -> ProxyTarget {
        ProxyTarget {
            route: "test".into(),
            backends: backends.into(),
            selector: Arc::new(RoundRobin::new()),
            client: upstream_client(),
            interceptor: None,
        }
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn rotates_across_backends() {
        let a = echo_backend("a").await;
        let b = echo_backend("b").await;
        let app = Router::new()
            .fallback(proxy_handler)
            .with_state(target(vec![a, b]));

        let mut seen = Vec::new();
        for _ in 0..4 {
            let request = Request::builder()
                .uri("/hello")
                .header("Host", "gateway.local")
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            seen.push(body_string(response).await);
        }
        assert_eq!(
            seen,
            vec![
                "a /hello gateway.local",
                "b /hello gateway.local",
                "a /hello gateway.local",
                "b /hello gateway.local",
            ]
        );
    }

    #[tokio::test]
    async fn unreachable_backend_is_bad_gateway() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let app = Router::new()
            .fallback(proxy_handler)
            .with_state(target(vec![Url::parse(&format!("http://{addr}")).unwrap()]));
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            body_string(response).await,
            r#"{"success":false,"code":502,"message":"Bad Gateway"}"#
        );
    }

    #[tokio::test]
    async fn no_backends_is_service_unavailable() {
        let app = Router::new().fallback(proxy_handler).with_state(target(Vec::new()));
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}

//! Delegated authentication gate.
//!
//! Forwards the client's headers (cookies included) to an auth server and
//! trusts its status code: `200` admits the request, anything else, or a
//! transport failure, rejects it with `401`. Selected auth-response headers
//! are then copied onto the downstream request as headers or query
//! parameters. Tokens are never inspected locally.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Request, Uri},
    middleware::Next,
    response::Response,
};
use url::{form_urlencoded, Url};

use crate::config::JwtAuthConfig;
use crate::http::request::{client_ip, user_agent};
use crate::http::response::ErrorResponder;

/// Headers describing the inbound hop that must not be replayed to the auth server.
const NOT_FORWARDED: [HeaderName; 3] = [
    header::HOST,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
];

#[derive(Debug)]
pub struct DelegatedAuth {
    required_headers: Vec<String>,
    auth_url: String,
    /// (auth response header, downstream header)
    headers: Vec<(String, HeaderName)>,
    /// (auth response header, downstream query parameter)
    params: Vec<(String, String)>,
    client: reqwest::Client,
    responder: ErrorResponder,
}

impl DelegatedAuth {
    pub fn new(config: &JwtAuthConfig, client: reqwest::Client, responder: ErrorResponder) -> Self {
        let headers = config
            .headers
            .iter()
            .filter_map(|(source, dest)| match HeaderName::from_bytes(dest.as_bytes()) {
                Ok(name) => Some((source.clone(), name)),
                Err(_) => {
                    tracing::warn!(header = %dest, "Skipping invalid destination header");
                    None
                }
            })
            .collect();

        Self {
            required_headers: config.required_headers.clone(),
            auth_url: config.url.clone(),
            headers,
            params: config
                .params
                .iter()
                .map(|(source, param)| (source.clone(), param.clone()))
                .collect(),
            client,
            responder,
        }
    }

    /// Name of the first required header that is absent or empty.
    fn missing_header(&self, headers: &HeaderMap) -> Option<&str> {
        self.required_headers
            .iter()
            .find(|name| {
                headers
                    .get(name.as_str())
                    .map(|v| v.as_bytes().is_empty())
                    .unwrap_or(true)
            })
            .map(String::as_str)
    }

    /// Copy the configured auth-response values onto the downstream request.
    fn apply(&self, auth_headers: &HeaderMap, request: &mut Request<Body>) -> Result<(), RewriteError> {
        for (source, dest) in &self.headers {
            let value = auth_headers
                .get(source.as_str())
                .cloned()
                .unwrap_or_else(|| HeaderValue::from_static(""));
            request.headers_mut().insert(dest.clone(), value);
        }

        if !self.params.is_empty() {
            let params: Vec<(&str, String)> = self
                .params
                .iter()
                .map(|(source, param)| {
                    let value = auth_headers
                        .get(source.as_str())
                        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                        .unwrap_or_default();
                    (param.as_str(), value)
                })
                .collect();
            *request.uri_mut() = set_query_params(request.uri(), &params)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to rewrite request URI: {0}")]
pub struct RewriteError(#[from] axum::http::Error);

/// Set `params` on the query of `uri`, keeping every other parameter.
///
/// Parameters are re-encoded sorted by name; values of the same name keep
/// their relative order.
pub fn set_query_params(uri: &Uri, params: &[(&str, String)]) -> Result<Uri, RewriteError> {
    let mut pairs: Vec<(String, String)> = uri
        .query()
        .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    for (name, value) in params {
        pairs.retain(|(k, _)| k != name);
        pairs.push((name.to_string(), value.clone()));
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(&pairs)
        .finish();
    let path_and_query = if query.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), query)
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(
        path_and_query
            .parse()
            .map_err(|e: axum::http::uri::InvalidUri| axum::http::Error::from(e))?,
    );
    Ok(Uri::from_parts(parts).map_err(axum::http::Error::from)?)
}

fn forwarded_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !NOT_FORWARDED.contains(name) {
            forwarded.append(name.clone(), value.clone());
        }
    }
    forwarded
}

pub async fn delegated_auth_middleware(
    State(auth): State<Arc<DelegatedAuth>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if let Some(missing) = auth.missing_header(request.headers()) {
        tracing::error!(header = %missing, uri = %request.uri(), "Missing required header");
        return auth.responder.unauthorized(request.headers());
    }

    let auth_url = match Url::parse(&auth.auth_url) {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(url = %auth.auth_url, error = %e, "Error parsing auth URL");
            return auth.responder.internal_error(request.headers());
        }
    };

    let auth_request = match auth
        .client
        .get(auth_url)
        .headers(forwarded_headers(request.headers()))
        .build()
    {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "Error creating authentication request");
            return auth.responder.internal_error(request.headers());
        }
    };

    // The response, and with it the connection, is released when dropped on
    // every path below; a dropped handler future abandons the call as well.
    let auth_response = match auth.client.execute(auth_request).await {
        Ok(r) if r.status() == reqwest::StatusCode::OK => r,
        outcome => {
            tracing::info!(
                method = %request.method(),
                client_ip = %client_ip(&request),
                uri = %request.uri(),
                user_agent = %user_agent(&request),
                "Rejected by auth server"
            );
            match outcome {
                Ok(r) => tracing::warn!(status = %r.status(), "Proxy authentication error"),
                Err(e) => tracing::warn!(error = %e, "Proxy authentication error"),
            }
            return auth.responder.unauthorized(request.headers());
        }
    };

    if let Err(e) = auth.apply(auth_response.headers(), &mut request) {
        tracing::error!(error = %e, "Error applying auth response to request");
        return auth.responder.internal_error(request.headers());
    }
    drop(auth_response);

    next.run(request).await
}

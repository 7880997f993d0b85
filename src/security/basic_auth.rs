//! Static-credential gate using the `Authorization: Basic` scheme.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::config::BasicAuthConfig;
use crate::http::request::client_ip;
use crate::http::response::ErrorResponder;

pub const BASIC_REALM: &str = r#"Basic realm="Restricted""#;
const BASIC_PREFIX: &str = "Basic ";

/// Why a request failed Basic authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BasicAuthError {
    #[error("missing Authorization header")]
    MissingHeader,
    #[error("Authorization header is not Basic")]
    NotBasic,
    #[error("credentials are not valid base64")]
    InvalidEncoding,
    #[error("credentials are not a username:password pair")]
    Malformed,
    #[error("invalid username or password")]
    InvalidCredentials,
}

#[derive(Debug)]
pub struct BasicAuth {
    username: String,
    password: String,
    responder: ErrorResponder,
}

impl BasicAuth {
    pub fn new(config: &BasicAuthConfig, responder: ErrorResponder) -> Self {
        Self {
            username: config.username.clone(),
            password: config.password.clone(),
            responder,
        }
    }

    /// Check the request's credentials against the configured pair.
    pub fn verify(&self, headers: &HeaderMap) -> Result<(), BasicAuthError> {
        let value = headers
            .get(header::AUTHORIZATION)
            .ok_or(BasicAuthError::MissingHeader)?;
        let encoded = value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix(BASIC_PREFIX))
            .ok_or(BasicAuthError::NotBasic)?;
        let decoded = STANDARD
            .decode(encoded)
            .map_err(|_| BasicAuthError::InvalidEncoding)?;
        let payload = String::from_utf8(decoded).map_err(|_| BasicAuthError::InvalidEncoding)?;
        let (username, password) = payload
            .split_once(':')
            .ok_or(BasicAuthError::Malformed)?;

        if username == self.username && password == self.password {
            Ok(())
        } else {
            Err(BasicAuthError::InvalidCredentials)
        }
    }
}

pub async fn basic_auth_middleware(
    State(auth): State<Arc<BasicAuth>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match auth.verify(request.headers()) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::warn!(
                client_ip = %client_ip(&request),
                uri = %request.uri(),
                error = %e,
                "Basic authentication failed"
            );
            let mut response = auth.responder.unauthorized(request.headers());
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(BASIC_REALM));
            response
        }
    }
}

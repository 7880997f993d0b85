//! Error responses.
//!
//! # Responsibilities
//! - Render the uniform JSON error envelope `{success, code, message}`
//! - Let a configured interceptor take over the error body
//! - Echo `Access-Control-Allow-Origin` for allow-listed origins
//!
//! # Design Decisions
//! - Responses are values, so rendering cannot fail half-way through a write
//! - Internal error details are logged by callers, never placed in the body

use std::fmt;
use std::sync::Arc;

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::config::ErrorInterceptorConfig;
use crate::http::cors;

pub const TOO_MANY_REQUESTS_MESSAGE: &str =
    "429 Too many requests, API rate limit exceeded. Please try again later";

/// JSON body of every gateway error.
#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    pub success: bool,
    pub code: u16,
    pub message: &'a str,
}

/// Hook that replaces the default error body.
pub trait ErrorInterceptor: Send + Sync + fmt::Debug {
    /// Build the error response, or `None` to fall back to the JSON envelope.
    fn intercept(&self, status: StatusCode, message: &str) -> Option<Response>;
}

pub type SharedInterceptor = Arc<dyn ErrorInterceptor>;

/// Render an error response for `status`.
pub fn respond(
    status: StatusCode,
    message: &str,
    interceptor: Option<&dyn ErrorInterceptor>,
) -> Response {
    if let Some(response) = interceptor.and_then(|i| i.intercept(status, message)) {
        return response;
    }
    let body = ErrorBody {
        success: false,
        code: status.as_u16(),
        message,
    };
    (status, Json(body)).into_response()
}

/// Error rendering shared by a gate: the origins it may echo and its interceptor.
#[derive(Debug, Clone)]
pub struct ErrorResponder {
    origins: Arc<[String]>,
    interceptor: Option<SharedInterceptor>,
}

impl Default for ErrorResponder {
    fn default() -> Self {
        Self::new(Vec::new(), None)
    }
}

impl ErrorResponder {
    pub fn new(origins: Vec<String>, interceptor: Option<SharedInterceptor>) -> Self {
        Self {
            origins: origins.into(),
            interceptor,
        }
    }

    /// Render an error for a request, echoing its origin when allow-listed.
    pub fn reject(&self, request_headers: &HeaderMap, status: StatusCode, message: &str) -> Response {
        let mut response = respond(status, message, self.interceptor.as_deref());
        cors::echo_allowed_origin(&self.origins, request_headers, response.headers_mut());
        response
    }

    pub fn unauthorized(&self, request_headers: &HeaderMap) -> Response {
        self.reject(request_headers, StatusCode::UNAUTHORIZED, "Unauthorized")
    }

    pub fn internal_error(&self, request_headers: &HeaderMap) -> Response {
        self.reject(
            request_headers,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error",
        )
    }

    pub fn too_many_requests(&self, request_headers: &HeaderMap) -> Response {
        self.reject(
            request_headers,
            StatusCode::TOO_MANY_REQUESTS,
            TOO_MANY_REQUESTS_MESSAGE,
        )
    }
}

/// Interceptor driven by configuration: a content type and a body template.
#[derive(Debug, Clone)]
pub struct TemplateInterceptor {
    content_type: HeaderValue,
    body: String,
    status_codes: Vec<u16>,
}

impl TemplateInterceptor {
    pub fn from_config(config: &ErrorInterceptorConfig) -> Self {
        let content_type = HeaderValue::from_str(&config.content_type).unwrap_or_else(|_| {
            tracing::warn!(content_type = %config.content_type, "Invalid interceptor content type");
            HeaderValue::from_static("text/plain; charset=utf-8")
        });
        Self {
            content_type,
            body: config.body.clone(),
            status_codes: config.status_codes.clone(),
        }
    }
}

impl ErrorInterceptor for TemplateInterceptor {
    fn intercept(&self, status: StatusCode, message: &str) -> Option<Response> {
        if !self.status_codes.is_empty() && !self.status_codes.contains(&status.as_u16()) {
            return None;
        }
        let body = self
            .body
            .replace("{code}", status.as_str())
            .replace("{message}", message);
        Some((status, [(header::CONTENT_TYPE, self.content_type.clone())], body).into_response())
    }
}

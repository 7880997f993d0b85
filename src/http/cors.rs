//! Origin allow-list matching.

use axum::http::{header, HeaderMap, HeaderValue};

const WILDCARD: &str = "*";

/// Returns true if `origin` is non-empty and allow-listed, or the list holds `*`.
pub fn is_allowed(allowed_origins: &[String], origin: &str) -> bool {
    if origin.is_empty() {
        return false;
    }
    allowed_origins
        .iter()
        .any(|allowed| allowed == WILDCARD || allowed == origin)
}

/// Copy the request `Origin` into `Access-Control-Allow-Origin` when allowed.
pub fn echo_allowed_origin(
    allowed_origins: &[String],
    request_headers: &HeaderMap,
    response_headers: &mut HeaderMap,
) {
    let Some(origin) = request_headers.get(header::ORIGIN) else {
        return;
    };
    if is_allowed(allowed_origins, origin.to_str().unwrap_or_default()) {
        response_headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::clone(origin));
    }
}

//! Request inspection helpers.
//!
//! # Responsibilities
//! - Resolve the client IP used for rate limiting and access logs
//! - Extract the user agent for access logs
//!
//! # Design Decisions
//! - `X-Real-IP` wins, then the first `X-Forwarded-For` hop, then the peer address
//! - Missing connection info resolves to "unknown" so all such clients share one bucket

use std::net::SocketAddr;

use axum::{
    extract::ConnectInfo,
    http::{header, HeaderName, Request},
};

pub static X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
pub static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Resolve the originating client IP of a request.
pub fn client_ip<B>(req: &Request<B>) -> String {
    let headers = req.headers();
    if let Some(ip) = headers
        .get(&X_REAL_IP)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return ip.to_string();
    }
    if let Some(ip) = headers
        .get(&X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return ip.to_string();
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn user_agent<B>(req: &Request<B>) -> &str {
    req.headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

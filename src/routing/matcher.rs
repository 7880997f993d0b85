//! Route matching logic.
//!
//! # Responsibilities
//! - Match host header against a host list (exact, case-insensitive)
//! - Match path prefix on segment boundaries (case-sensitive)
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Host matching is case-insensitive and ignores the port
//! - Path matching is case-sensitive
//! - Empty host list = always matches (wildcard)
//! - No regex to guarantee O(n) matching

use axum::http::{header, Request};

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches<B>(&self, req: &Request<B>) -> bool;
}

/// Matches the Host header against any of a list of hosts.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    hosts: Vec<String>,
}

impl HostMatcher {
    /// Hosts are normalized to lowercase for case-insensitive matching.
    pub fn new(hosts: &[String]) -> Self {
        Self {
            hosts: hosts.iter().map(|h| h.to_lowercase()).collect(),
        }
    }
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !name.ends_with(':') && port.bytes().all(|b| b.is_ascii_digit()) => {
            name
        }
        _ => host,
    }
}

impl Matcher for HostMatcher {
    fn matches<B>(&self, req: &Request<B>) -> bool {
        if self.hosts.is_empty() {
            return true;
        }
        let host = req
            .headers()
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
            .or_else(|| req.uri().host().map(str::to_string));
        let Some(host) = host else {
            return false;
        };
        let host = host.to_lowercase();
        let bare = strip_port(&host);
        self.hosts.iter().any(|h| *h == host || h == bare)
    }
}

/// Matches the request path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches<B>(&self, req: &Request<B>) -> bool {
        let path = req.uri().path();
        let Some(rest) = path.strip_prefix(self.prefix.as_str()) else {
            return false;
        };
        // "/api" matches "/api" and "/api/x" but not "/apix".
        self.prefix.ends_with('/') || rest.is_empty() || rest.starts_with('/')
    }
}

/// A route's full match condition: path prefix AND host.
#[derive(Debug, Clone)]
pub struct RouteMatcher {
    pub path: PathPrefixMatcher,
    pub host: HostMatcher,
}

impl Matcher for RouteMatcher {
    fn matches<B>(&self, req: &Request<B>) -> bool {
        self.path.matches(req) && self.host.matches(req)
    }
}

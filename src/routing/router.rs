//! Route lookup and the swappable route table.
//!
//! # Responsibilities
//! - Store compiled routes, longest path first
//! - Look up matching route for request
//! - Replace the whole route set atomically on reload
//!
//! # Design Decisions
//! - A `RouteTable` is immutable once built (thread-safe without locks)
//! - Readers take a snapshot; a reload swaps in a new table, so readers see
//!   either the old set or the new one, never a mix
//! - Explicit no-match rather than silent default

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{http::Request, Router};
use url::Url;

use crate::routing::matcher::{Matcher, RouteMatcher};
use crate::security::rate_limit::RateLimiter;

/// A compiled route: match condition, backends and its gated proxy service.
#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    pub matcher: RouteMatcher,
    pub backends: Arc<[Url]>,
    /// Names of the gates wrapped around `service`, in run order.
    pub gates: Vec<String>,
    /// Route-level rate limiters, for sweeping. The gateway-wide one is not listed.
    pub limiters: Vec<Arc<RateLimiter>>,
    /// Gated proxy handler for this route.
    pub service: Router,
}

impl Route {
    pub fn path(&self) -> &str {
        self.matcher.path.prefix()
    }
}

/// An immutable set of routes.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        let mut routes: Vec<Arc<Route>> = routes.into_iter().map(Arc::new).collect();
        // Longest prefix wins; the sort is stable so ties keep config order.
        routes.sort_by(|a, b| b.path().len().cmp(&a.path().len()));
        Self { routes }
    }

    /// Find the route for a request.
    pub fn match_request<B>(&self, req: &Request<B>) -> Option<Arc<Route>> {
        self.routes
            .iter()
            .find(|route| route.matcher.matches(req))
            .cloned()
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// The process-wide route set, replaced as a whole on reload.
#[derive(Debug)]
pub struct DynamicRouteTable {
    current: ArcSwap<RouteTable>,
}

impl DynamicRouteTable {
    pub fn new(table: RouteTable) -> Self {
        Self {
            current: ArcSwap::from_pointee(table),
        }
    }

    /// The current table. Holding the snapshot keeps it alive across a reload.
    pub fn snapshot(&self) -> Arc<RouteTable> {
        self.current.load_full()
    }

    /// Swap in a new table.
    pub fn replace(&self, table: RouteTable) {
        let count = table.len();
        self.current.store(Arc::new(table));
        tracing::info!(routes = count, "Route table replaced");
    }
}

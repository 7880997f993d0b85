//! Gate composition.
//!
//! Every gate exposes one capability: wrap a router so the gate runs before
//! it. Auth and rate limiting are closed sets of variants.

use std::sync::Arc;

use axum::{middleware::from_fn_with_state, Router};

use crate::security::basic_auth::{basic_auth_middleware, BasicAuth};
use crate::security::delegated_auth::{delegated_auth_middleware, DelegatedAuth};
use crate::security::rate_limit::{rate_limit_middleware, RateLimiter};

pub trait Gate {
    /// Wrap `router` so this gate runs before it.
    fn wrap(&self, router: Router) -> Router;
}

#[derive(Debug, Clone)]
pub enum AuthGate {
    Basic(Arc<BasicAuth>),
    Delegated(Arc<DelegatedAuth>),
}

impl Gate for AuthGate {
    fn wrap(&self, router: Router) -> Router {
        match self {
            AuthGate::Basic(auth) => {
                router.layer(from_fn_with_state(auth.clone(), basic_auth_middleware))
            }
            AuthGate::Delegated(auth) => {
                router.layer(from_fn_with_state(auth.clone(), delegated_auth_middleware))
            }
        }
    }
}

impl Gate for Arc<RateLimiter> {
    fn wrap(&self, router: Router) -> Router {
        router.layer(from_fn_with_state(self.clone(), rate_limit_middleware))
    }
}

/// Any gate a route can carry.
#[derive(Debug, Clone)]
pub enum RouteGate {
    Auth(AuthGate),
    RateLimit(Arc<RateLimiter>),
}

impl RouteGate {
    pub fn is_auth(&self) -> bool {
        matches!(self, RouteGate::Auth(_))
    }
}

impl Gate for RouteGate {
    fn wrap(&self, router: Router) -> Router {
        match self {
            RouteGate::Auth(gate) => gate.wrap(router),
            RouteGate::RateLimit(limiter) => limiter.wrap(router),
        }
    }
}

/// Wrap `router` in `gates` so that `gates[0]` runs first.
pub fn wrap_all(router: Router, gates: &[RouteGate]) -> Router {
    // The last layer applied is the outermost one.
    gates.iter().rev().fold(router, |router, gate| gate.wrap(router))
}

//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path)
//!     → router.rs (route lookup on the current table snapshot)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: matched Route or NoMatch
//!
//! Route Compilation (startup and reload):
//!     GatewayConfig
//!     → builder.rs (gates + proxy handler per route)
//!     → Sort by path length
//!     → Freeze as immutable RouteTable, swapped into DynamicRouteTable
//! ```
//!
//! # Design Decisions
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - Longest path prefix wins

pub mod builder;
pub mod matcher;
pub mod router;

pub use builder::RouteBuilder;
pub use router::{DynamicRouteTable, Route, RouteTable};

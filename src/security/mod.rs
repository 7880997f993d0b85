//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (route already matched):
//!     → basic_auth.rs / delegated_auth.rs (authenticate)
//!     → rate_limit (per-IP limits, local or redis)
//!     → Pass to proxy handler
//! ```
//!
//! # Design Decisions
//! - Gates compose through a single `wrap` capability (gate.rs)
//! - Fail closed: reject on any security check failure
//! - Rejections always end in a rendered error, never a fault

pub mod basic_auth;
pub mod delegated_auth;
pub mod gate;
pub mod rate_limit;

pub use gate::{wrap_all, AuthGate, Gate, RouteGate};

//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched → route backends identified
//!     → round_robin.rs (rotate through backends)
//!     → Forward to the selected backend
//! ```
//!
//! # Design Decisions
//! - One selector per gateway, shared by all routes and kept across reloads
//! - Selection is a single atomic increment, no locks
//! - Fairness holds over time, not within a burst

pub mod round_robin;

pub use round_robin::RoundRobin;

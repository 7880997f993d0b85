//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields (client_ip, route, backend, ...)
//!     → logging.rs (subscriber: env filter + fmt layer)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through all subsystems (set by the server's request-id layer)
//! - `RUST_LOG` overrides the configured level

pub mod logging;

//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout, body limit)
//!     → [routing layer matches the route]
//!     → [route gates: auth, rate limit]
//!     → proxy.rs (round robin backend, forward)
//!     → Send to client
//!
//! Any rejection → response.rs (JSON envelope or interceptor, CORS echo via cors.rs)
//! ```

pub mod cors;
pub mod proxy;
pub mod request;
pub mod response;
pub mod server;

pub use request::{client_ip, user_agent};
pub use response::{respond, ErrorInterceptor, ErrorResponder, TemplateInterceptor};
pub use server::HttpServer;

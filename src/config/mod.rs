//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server rebuilds routes and swaps the route table
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BasicAuthConfig, CorsConfig, ErrorInterceptorConfig, GatewayConfig, JwtAuthConfig,
    ListenerConfig, MiddlewareConfig, MiddlewareKind, ObservabilityConfig, RateLimitConfig,
    RedisConfig, RouteConfig, SecurityConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};

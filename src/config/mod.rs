//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, base64 keys via keys.rs)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → handed to HttpServer once at startup
//!
//! --setup:
//!     loader.rs reads what it can
//!     → fresh keys generated
//!     → file written back
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; key rotation means restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod keys;
pub mod loader;
pub mod schema;
pub mod validation;

pub use keys::Key;
pub use schema::{
    DatabaseConfig, DatabaseKind, GatewayConfig, KeysConfig, ListenerConfig,
    ObservabilityConfig, RelayConfig, SessionConfig, UpstreamConfig, WebConfig,
};

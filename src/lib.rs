//! Authenticating gateway library.
//!
//! Puts a login wall (salted credentials, signed cookie sessions) in front of
//! a single upstream and proxies both plain HTTP and WebSocket traffic to it.

pub mod auth;
pub mod captcha;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod session;

pub use config::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;

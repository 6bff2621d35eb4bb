//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → /proxy/* → handlers.rs (login, register, logout, menu, static)
//!     → anything else → session gate
//!         → detect.rs (WebSocket upgrade?)
//!             yes → websocket.rs (DuplexRelay)
//!             no  → forward.rs (ReverseForwarder)
//!     → Send to client
//! ```

pub mod detect;
pub mod forward;
pub mod handlers;
pub mod pages;
pub mod server;
pub mod websocket;

pub use detect::is_websocket_upgrade;
pub use forward::ReverseForwarder;
pub use server::{AppState, HttpServer, ServerError};
pub use websocket::{DuplexRelay, RelayError};

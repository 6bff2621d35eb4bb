//! Cookie sessions and the login gate.
//!
//! # Data Flow
//! ```text
//! Cookie header
//!     → cookie.rs (verify MAC, decrypt, check age)
//!     → Session { logged_in }
//!     → gate.rs (Allow / Redirect / Reject)
//!     → forwarder or relay
//! ```

pub mod cookie;
pub mod gate;

pub use cookie::{Session, SessionError, SessionStore};
pub use gate::{evaluate, require_login, GateDecision, LOGIN_PATH};

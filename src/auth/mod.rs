//! Credential subsystem.
//!
//! # Data Flow
//! ```text
//! POST /proxy/register
//!     → hasher.rs (fresh salt, digest)
//!     → store backend (atomic check-and-insert)
//!
//! POST /proxy/login
//!     → store backend (lookup)
//!     → hasher.rs (recompute digest, timing-safe compare)
//! ```
//!
//! # Design Decisions
//! - One minimal trait (`CredentialStore`) so new backends don't touch the gate
//! - Ephemeral backend is a bootstrap/testing aid, sled is the durable one
//! - Unknown users and wrong passwords collapse to one outcome for callers

pub mod ephemeral;
pub mod hasher;
pub mod record;
pub mod sled_store;
pub mod store;

pub use ephemeral::EphemeralStore;
pub use sled_store::SledStore;
pub use store::{AuthError, CredentialStore, User};

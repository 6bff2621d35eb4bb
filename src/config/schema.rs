//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::keys::Key;

/// Root configuration for the authenticating gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The single protected upstream.
    pub upstream: UpstreamConfig,

    /// Session and captcha secrets.
    pub keys: KeysConfig,

    /// Session cookie settings.
    pub session: SessionConfig,

    /// Credential store backend.
    pub database: DatabaseConfig,

    /// Pages, static assets and root redirect.
    pub web: WebConfig,

    /// WebSocket relay settings.
    pub relay: RelayConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:80").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:80".to_string(),
        }
    }
}

/// Upstream configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Destination `host:port` for both HTTP forwarding and WebSocket relaying.
    pub destination: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            destination: "localhost:8080".to_string(),
        }
    }
}

/// Process-wide secrets.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct KeysConfig {
    /// HMAC key for session cookies (64 bytes, base64 in the file).
    pub authentication_key: Key,

    /// Encryption key for session cookies (32 bytes, base64 in the file).
    pub encryption_key: Key,

    /// reCAPTCHA server secret. Empty disables captcha checks.
    pub recaptcha_secret: String,

    /// reCAPTCHA site key rendered into the registration page.
    pub recaptcha_site_key: String,
}

/// Session cookie settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie name.
    pub cookie_name: String,

    /// Cookie lifetime in seconds.
    pub max_age_secs: u64,

    /// Mark the cookie `Secure` (HTTPS-only).
    pub secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "auth".to_string(),
            max_age_secs: 86_400 * 30,
            secure: false,
        }
    }
}

/// Credential backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    /// Single in-memory user, for bootstrapping only.
    Dummy,
    /// Durable sled database.
    #[serde(alias = "bolt")]
    Sled,
}

/// Credential store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Backend kind.
    pub kind: DatabaseKind,

    /// Database path, or `"<username> <password>"` for the dummy backend.
    pub location: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            kind: DatabaseKind::Sled,
            location: "authprox.db".to_string(),
        }
    }
}

/// Web surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct WebConfig {
    /// Directory served under `/proxy/static`.
    pub static_dir: Option<PathBuf>,

    /// Directory of `<view>.html` files overriding the built-in pages.
    pub pages_dir: Option<PathBuf>,

    /// If set, `/` answers with a permanent redirect here.
    pub root_redirect: Option<String>,
}

/// WebSocket relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Upstream WebSocket handshake timeout in milliseconds.
    pub handshake_timeout_ms: u64,

    /// How long the second direction may take to wind down after the first stops.
    pub close_grace_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 1000,
            close_grace_ms: 5000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Append error-level events to this file as well.
    pub log_file: Option<PathBuf>,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

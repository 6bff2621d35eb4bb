//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check key lengths required by the session store
//! - Validate addresses and value ranges (timeouts > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::{DatabaseKind, GatewayConfig};
use crate::session::cookie::{ENCRYPTION_KEY_LEN, SIGNING_KEY_LEN};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let destination = config.upstream.destination.trim();
    match destination.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
        _ => errors.push(ValidationError::new(
            "upstream.destination",
            format!("'{}' must be host:port", destination),
        )),
    }

    if config.keys.authentication_key.len() != SIGNING_KEY_LEN {
        errors.push(ValidationError::new(
            "keys.authentication_key",
            format!(
                "must be {} bytes, got {} (run with --setup to generate keys)",
                SIGNING_KEY_LEN,
                config.keys.authentication_key.len()
            ),
        ));
    }
    if config.keys.encryption_key.len() != ENCRYPTION_KEY_LEN {
        errors.push(ValidationError::new(
            "keys.encryption_key",
            format!(
                "must be {} bytes, got {} (run with --setup to generate keys)",
                ENCRYPTION_KEY_LEN,
                config.keys.encryption_key.len()
            ),
        ));
    }

    if config.session.cookie_name.trim().is_empty() {
        errors.push(ValidationError::new("session.cookie_name", "must not be empty"));
    }

    match config.database.kind {
        DatabaseKind::Dummy => {
            if config.database.location.split_whitespace().count() < 2 {
                errors.push(ValidationError::new(
                    "database.location",
                    "expected '<username> <password>' for the dummy backend",
                ));
            }
        }
        DatabaseKind::Sled => {
            if config.database.location.trim().is_empty() {
                errors.push(ValidationError::new("database.location", "must not be empty"));
            }
        }
    }

    if config.relay.handshake_timeout_ms == 0 {
        errors.push(ValidationError::new("relay.handshake_timeout_ms", "must be > 0"));
    }
    if config.relay.close_grace_ms == 0 {
        errors.push(ValidationError::new("relay.close_grace_ms", "must be > 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::keys::Key;

    fn valid() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.keys.authentication_key = Key::generate(64);
        config.keys.encryption_key = Key::generate(32);
        config
    }

    #[test]
    fn defaults_with_keys_are_valid() {
        assert_eq!(validate_config(&valid()), Ok(()));
    }

    #[test]
    fn reports_every_problem() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "nope".into();
        config.upstream.destination = "no-port".into();
        config.relay.handshake_timeout_ms = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert!(fields.contains(&"listener.bind_address"));
        assert!(fields.contains(&"upstream.destination"));
        assert!(fields.contains(&"keys.authentication_key"));
        assert!(fields.contains(&"keys.encryption_key"));
        assert!(fields.contains(&"relay.handshake_timeout_ms"));
    }

    #[test]
    fn swapped_keys_are_rejected() {
        let mut config = valid();
        std::mem::swap(&mut config.keys.authentication_key, &mut config.keys.encryption_key);
        assert_eq!(validate_config(&config).unwrap_err().len(), 2);
    }

    #[test]
    fn dummy_backend_needs_credentials() {
        let mut config = valid();
        config.database.kind = DatabaseKind::Dummy;
        config.database.location = "admin".into();
        assert!(validate_config(&config).is_err());

        config.database.location = "admin secret".into();
        assert!(validate_config(&config).is_ok());
    }
}

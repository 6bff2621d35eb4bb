//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the configured credential store
//! - Pick the captcha verifier
//! - Install the metrics exporter when enabled
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently

use std::sync::Arc;

use crate::auth::{AuthError, CredentialStore, EphemeralStore, SledStore};
use crate::captcha::{AcceptAll, CaptchaError, CaptchaVerifier, Recaptcha};
use crate::config::{DatabaseConfig, DatabaseKind, KeysConfig, ObservabilityConfig};
use crate::observability::metrics;

/// Open the credential store named by `config`.
pub fn open_credential_store(config: &DatabaseConfig) -> Result<Arc<dyn CredentialStore>, AuthError> {
    match config.kind {
        DatabaseKind::Dummy => {
            let mut words = config.location.split_whitespace();
            let (Some(username), Some(password)) = (words.next(), words.next()) else {
                tracing::error!(
                    expected = "<username> <password>",
                    found = %config.location,
                    "Invalid dummy database configuration"
                );
                return Err(AuthError::Storage(
                    "dummy database location must be \"<username> <password>\"".into(),
                ));
            };
            tracing::warn!(user = %username, "Using in-memory credential store");
            Ok(Arc::new(EphemeralStore::with_user(username, password)))
        }
        DatabaseKind::Sled => {
            let store = SledStore::open(&config.location)?;
            tracing::info!(location = %config.location, users = store.len(), "Opened credential database");
            Ok(Arc::new(store))
        }
    }
}

/// Captcha verifier for the configured secret.
pub fn build_captcha(keys: &KeysConfig) -> Result<Arc<dyn CaptchaVerifier>, CaptchaError> {
    if keys.recaptcha_secret.is_empty() {
        tracing::warn!("No reCaptcha secret configured, registration is not protected");
        return Ok(Arc::new(AcceptAll));
    }
    Ok(Arc::new(Recaptcha::new(keys.recaptcha_secret.clone())?))
}

/// Start the Prometheus exporter if enabled. Failures are logged, not fatal.
pub fn start_metrics(config: &ObservabilityConfig) {
    if !config.metrics_enabled {
        return;
    }
    match config.metrics_address.parse() {
        Ok(addr) => {
            if let Err(e) = metrics::init_metrics(addr) {
                tracing::error!(error = %e, "Failed to install metrics exporter");
            }
        }
        Err(_) => tracing::error!(
            metrics_address = %config.metrics_address,
            "Failed to parse metrics address"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_store_bootstraps_single_admin() {
        let config = DatabaseConfig {
            kind: DatabaseKind::Dummy,
            location: "admin hunter2".into(),
        };
        let store = open_credential_store(&config).unwrap();
        assert!(store.authenticate("admin", "hunter2"));
        assert!(store.get("admin").unwrap().admin);
    }

    #[test]
    fn dummy_store_needs_two_words() {
        let config = DatabaseConfig {
            kind: DatabaseKind::Dummy,
            location: "admin".into(),
        };
        assert!(matches!(open_credential_store(&config), Err(AuthError::Storage(_))));
    }

    #[test]
    fn sled_store_opens_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            kind: DatabaseKind::Sled,
            location: dir.path().join("users.db").to_string_lossy().into_owned(),
        };
        let store = open_credential_store(&config).unwrap();
        store.register("alice", "pw").unwrap();
        assert!(store.authenticate("alice", "pw"));
    }
}

//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::keys::Key;
use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::session::cookie::{ENCRYPTION_KEY_LEN, SIGNING_KEY_LEN};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Serialize(e) => write!(f, "Serialize error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse a TOML file without semantic validation.
pub fn read_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    toml::from_str(&content).map_err(ConfigError::Parse)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let config = read_config(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        destination = %config.upstream.destination,
        db_kind = ?config.database.kind,
        log_file = ?config.observability.log_file,
        "Loaded config"
    );
    Ok(config)
}

/// Replace both session keys with fresh random ones.
pub fn generate_keys(config: &mut GatewayConfig) {
    config.keys.authentication_key = Key::generate(SIGNING_KEY_LEN);
    config.keys.encryption_key = Key::generate(ENCRYPTION_KEY_LEN);
}

/// Write `config` to `path` as TOML.
pub fn save_config(path: &Path, config: &GatewayConfig) -> Result<(), ConfigError> {
    let text = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    fs::write(path, text).map_err(ConfigError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_output_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authprox.toml");

        let mut config = GatewayConfig::default();
        config.upstream.destination = "127.0.0.1:9000".into();
        generate_keys(&mut config);
        save_config(&path, &config).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.upstream.destination, "127.0.0.1:9000");
        assert_eq!(loaded.keys.authentication_key, config.keys.authentication_key);
        assert_eq!(loaded.keys.encryption_key.len(), ENCRYPTION_KEY_LEN);
    }

    #[test]
    fn missing_keys_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authprox.toml");
        fs::write(&path, "[upstream]\ndestination = \"localhost:8080\"\n").unwrap();

        assert!(matches!(load_config(&path), Err(ConfigError::Validation(_))));
        assert!(read_config(&path).is_ok());
    }
}

//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber
//! - Mirror ERROR events into a log file when one is configured
//!
//! # Design Decisions
//! - `RUST_LOG` wins over `observability.log_level`
//! - The error file is appended to, never truncated

use std::fs::OpenOptions;
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::ObservabilityConfig;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("cannot open log file: {0}")]
    LogFile(#[from] std::io::Error),
    #[error("cannot install subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Default filter directives for `level`.
pub fn default_directives(level: &str) -> String {
    format!("authprox={level},tower_http={level}")
}

/// Install the global subscriber.
pub fn init(config: &ObservabilityConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));

    let error_file = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(LevelFilter::ERROR),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(error_file)
        .try_init()?;

    if let Some(path) = &config.log_file {
        tracing::info!(log_file = %path.display(), "Error log file attached");
    }
    Ok(())
}

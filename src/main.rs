//! AuthProx: authenticating gateway (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌───────────────────────────────────────────────────────┐
//!                    │                      AUTHPROX                          │
//!                    │                                                        │
//!  Client Request    │  ┌─────────┐   /proxy/*   ┌──────────┐   ┌─────────┐   │
//!  ──────────────────┼─▶│  http   │─────────────▶│ handlers │──▶│  auth   │   │
//!                    │  │ server  │              └────┬─────┘   │ (sled)  │   │
//!                    │  └────┬────┘                   │         └─────────┘   │
//!                    │       │ other paths            ▼                       │
//!                    │       ▼                  ┌──────────┐                  │
//!                    │  ┌─────────┐             │ session  │                  │
//!                    │  │  gate   │◀────────────│  cookie  │                  │
//!                    │  └────┬────┘             └──────────┘                  │
//!                    │       │ logged in                                      │
//!                    │       ▼                                                │
//!                    │  ┌─────────┐  upgrade   ┌──────────────┐               │
//!  Client Response   │  │ detect  │──────────▶│ DuplexRelay  │◀──────────────┼──── Upstream
//!  ◀─────────────────┼──│         │  plain     ├──────────────┤               │     (ws://)
//!                    │  └─────────┘──────────▶│  Forwarder   │◀──────────────┼──── Upstream
//!                    │                         └──────────────┘               │     (http://)
//!                    └───────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use authprox::config::loader::{generate_keys, load_config, read_config, save_config, ConfigError};
use authprox::config::GatewayConfig;
use authprox::http::HttpServer;
use authprox::lifecycle::{signals, startup, Shutdown};
use authprox::observability::logging;

#[derive(Debug, Parser)]
#[command(name = "authprox", version, about = "Authenticating reverse proxy with WebSocket support")]
struct Cli {
    /// Configuration file.
    #[arg(short = 'f', long = "config", default_value = "authprox.toml")]
    config: PathBuf,

    /// Generate fresh session keys into the configuration file and exit.
    #[arg(long)]
    setup: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.setup {
        return setup(&cli.config);
    }

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("authprox: cannot load {}: {}", cli.config.display(), e);
            return Err(e.into());
        }
    };
    logging::init(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "authprox starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        destination = %config.upstream.destination,
        db_kind = ?config.database.kind,
        "Configuration loaded"
    );

    startup::start_metrics(&config.observability);

    let credentials = startup::open_credential_store(&config.database).map_err(|e| {
        tracing::error!(error = %e, location = %config.database.location, "Cannot open credential store");
        e
    })?;
    let captcha = startup::build_captcha(&config.keys)?;
    let server = HttpServer::new(&config, credentials, captcha)?;

    // Bind TCP listener
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// `--setup`: write fresh keys into the config file, keeping everything else.
fn setup(path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match read_config(path) {
        Ok(config) => config,
        Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => GatewayConfig::default(),
        Err(e) => return Err(e.into()),
    };
    generate_keys(&mut config);
    save_config(path, &config)?;
    println!(
        "Wrote new authentication and encryption keys to {}. Existing sessions are now invalid.",
        path.display()
    );
    Ok(())
}

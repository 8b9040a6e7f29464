//! `sealed-gateway`: binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from `CONFIG_PATH` and environment variables.
//! 2. Initialise the telemetry pipeline (JSON logs, optional OTLP export).
//! 3. Decode the shared secret once and build [`AppState`]. An invalid secret
//!    aborts startup here rather than failing per request.
//! 4. Build the Axum router and serve it over plain TCP or rustls.

mod config;
mod server;
mod telemetry;

use anyhow::{Context, Result};
use tracing::info;

use config::Config;
use server::{state::AppState, tls};

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        use_https = cfg.use_https,
        timestamp_window_secs = cfg.timestamp_window_secs,
        "sealed-gateway starting"
    );

    // -----------------------------------------------------------------------
    // 3. Application state
    // -----------------------------------------------------------------------
    let state = AppState::from_config(&cfg)?;
    let router = server::router::build(state);

    // -----------------------------------------------------------------------
    // 4. HTTP(S) server
    // -----------------------------------------------------------------------
    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    if cfg.use_https {
        let cert_path = cfg
            .tls_cert_path
            .as_deref()
            .context("TLS_CERT_PATH is required when USE_HTTPS is set")?;
        let key_path = cfg
            .tls_key_path
            .as_deref()
            .context("TLS_KEY_PATH is required when USE_HTTPS is set")?;
        let tls_config = tls::load_server_config(cert_path, key_path)?;
        info!(addr = %addr, "listening (https)");
        tls::serve(listener, tls_config, router).await
    } else {
        info!(addr = %addr, "listening (http)");
        axum::serve(listener, router).await?;
        Ok(())
    }
}

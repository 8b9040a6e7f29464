//! Configuration loading and validation for the gateway.
//!
//! Values come from an optional YAML file named by `CONFIG_PATH`, overlaid by
//! environment variables (`API_SECRET`, `TIMESTAMP_WINDOW_SECS`, ...). The
//! process exits with a clear error message if anything is missing or invalid,
//! including a shared secret of the wrong length.

use anyhow::{Context, Result};
use common::{replay::ReplayGuard, SharedSecret};
use serde::Deserialize;

/// Environment variable naming an optional YAML configuration file.
pub const CONFIG_PATH_VAR: &str = "CONFIG_PATH";

/// Validated gateway configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Shared secret for HMAC and AES-GCM. Raw bytes of the string, or
    /// `base64:<...>`. Must be 16, 24 or 32 bytes. **Required.**
    pub api_secret: String,

    /// How old (seconds) a request timestamp may be.
    #[serde(default = "default_timestamp_window")]
    pub timestamp_window_secs: u64,

    /// How far (seconds) in the future a request timestamp may be. Unset means
    /// future timestamps are not checked.
    #[serde(default)]
    pub max_future_skew_secs: Option<u64>,

    /// Port the HTTP(S) server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Upper bound on a buffered request body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// If set, requests whose `Host` differs are refused with 403.
    #[serde(default)]
    pub allowed_domain: Option<String>,

    /// Serve over TLS and send `Strict-Transport-Security`.
    #[serde(default)]
    pub use_https: bool,

    /// PEM certificate chain. Required when `use_https` is set.
    #[serde(default)]
    pub tls_cert_path: Option<String>,

    /// PEM private key. Required when `use_https` is set.
    #[serde(default)]
    pub tls_key_path: Option<String>,

    /// OTLP endpoint for span export. Logs only when unset.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_timestamp_window() -> u64 {
    300
}
fn default_listen_port() -> u16 {
    8080
}
fn default_max_body_bytes() -> usize {
    1024 * 1024
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from `CONFIG_PATH` and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a required value is absent,
    /// or validation fails.
    pub fn from_env() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_PATH_VAR) {
            builder = builder.add_source(config::File::new(&path, config::FileFormat::Yaml));
        }
        let cfg = builder
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.api_secret, "API_SECRET")?;
        self.shared_secret()?;

        if self.timestamp_window_secs == 0 {
            anyhow::bail!("TIMESTAMP_WINDOW_SECS must be > 0");
        }
        if self.max_body_bytes == 0 {
            anyhow::bail!("MAX_BODY_BYTES must be > 0");
        }
        if self.use_https {
            ensure_non_empty(self.tls_cert_path.as_deref().unwrap_or(""), "TLS_CERT_PATH")?;
            ensure_non_empty(self.tls_key_path.as_deref().unwrap_or(""), "TLS_KEY_PATH")?;
        }
        Ok(())
    }

    /// Decode the configured shared secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is not 16, 24 or 32 bytes after decoding.
    pub fn shared_secret(&self) -> Result<SharedSecret> {
        SharedSecret::from_config_value(&self.api_secret).context("API_SECRET is invalid")
    }

    /// Build the replay guard for the configured window and skew.
    pub fn replay_guard(&self) -> ReplayGuard {
        let guard = ReplayGuard::new(self.timestamp_window_secs);
        match self.max_future_skew_secs {
            Some(skew) => guard.with_max_future_skew(skew),
            None => guard,
        }
    }

    /// The allowed host, treating an empty value as unset.
    pub fn allowed_domain(&self) -> Option<&str> {
        self.allowed_domain
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_secret", &"[REDACTED]")
            .field("timestamp_window_secs", &self.timestamp_window_secs)
            .field("max_future_skew_secs", &self.max_future_skew_secs)
            .field("listen_port", &self.listen_port)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("allowed_domain", &self.allowed_domain)
            .field("use_https", &self.use_https)
            .field("tls_cert_path", &self.tls_cert_path)
            .field("tls_key_path", &self.tls_key_path)
            .field("otel_exporter_otlp_endpoint", &self.otel_exporter_otlp_endpoint)
            .field("log_level", &self.log_level)
            .finish()
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}

//! Shared application state injected into every Axum handler and middleware.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use common::{replay::ReplayGuard, SharedSecret};

use super::envelope::EnvelopeWriter;
use crate::config::Config;

/// Default upper bound on a buffered request body (1 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Source of the current Unix time in seconds.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> i64;
}

/// [`Clock`] backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .and_then(|d| i64::try_from(d.as_secs()).ok())
            .unwrap_or(0)
    }
}

/// Application state shared across all request handlers.
///
/// Everything here is read-only after startup. All fields are cheaply
/// cloneable so Axum can clone the state per request.
#[derive(Clone)]
pub struct AppState {
    /// Shared secret used to verify signatures and open request envelopes.
    pub secret: SharedSecret,
    /// Timestamp freshness policy.
    pub guard: ReplayGuard,
    /// Seals every response on protected routes.
    pub writer: EnvelopeWriter,
    /// Time source for the replay guard.
    pub clock: Arc<dyn Clock>,
    /// Upper bound on a buffered request body.
    pub max_body_bytes: usize,
    /// Host that requests must target, if restricted.
    pub allowed_domain: Option<Arc<str>>,
    /// Whether the gateway is served over TLS.
    pub use_https: bool,
}

impl AppState {
    /// Create state with the given secret and guard, the system clock and
    /// default limits.
    pub fn new(secret: SharedSecret, guard: ReplayGuard) -> Self {
        Self {
            writer: EnvelopeWriter::new(Arc::new(secret.clone())),
            secret,
            guard,
            clock: Arc::new(SystemClock),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            allowed_domain: None,
            use_https: false,
        }
    }

    /// Build state from validated configuration. The shared secret is decoded
    /// here, once, for the lifetime of the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured secret is invalid.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let mut state = Self::new(cfg.shared_secret()?, cfg.replay_guard());
        state.max_body_bytes = cfg.max_body_bytes;
        state.allowed_domain = cfg.allowed_domain().map(Arc::from);
        state.use_https = cfg.use_https;
        Ok(state)
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[cfg(test)]
    pub fn with_writer(mut self, writer: EnvelopeWriter) -> Self {
        self.writer = writer;
        self
    }
}

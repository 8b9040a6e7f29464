//! Structured logging and optional OpenTelemetry span export.
//!
//! # Telemetry invariants
//!
//! - The shared secret, signatures and request/response plaintext never appear
//!   in any span attribute or log field.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`); `RUST_LOG`
//!   takes precedence.

pub mod init;

pub use init::init_telemetry;

//! Sealed request protocol shared by the gateway and its clients.
//!
//! - [`cipher`]: AES-GCM envelopes with a detached tag.
//! - [`signer`]: canonical request strings and HMAC-SHA256 signatures.
//! - [`replay`]: timestamp freshness window.
//! - [`client`]: the sending side, for Rust callers and tests.

pub mod cipher;
pub mod client;
pub mod error;
pub mod protocol;
pub mod replay;
pub mod secret;
pub mod signer;

pub use error::ProtocolError;
pub use protocol::Envelope;
pub use secret::SharedSecret;

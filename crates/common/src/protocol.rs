//! Wire types exchanged between clients and the gateway.
//!
//! Every request and response body on a protected route is an [`Envelope`].
//! The plaintext inside is JSON; for error responses that JSON is an
//! [`ErrorResponse`].

use serde::{Deserialize, Serialize};

/// Request header carrying the issuance time in integer seconds since the epoch.
pub const TIMESTAMP_HEADER: &str = "x-timestamp";

/// Request header carrying the hex HMAC-SHA256 over the canonical string.
pub const SIGNATURE_HEADER: &str = "x-signature";

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Authenticated-encrypted payload as it travels on the wire.
///
/// All three fields are standard base64. The ciphertext in `data` excludes
/// the authentication tag, which travels separately in `tag`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64 ciphertext without the tag.
    pub data: String,
    /// Base64 nonce; must decode to exactly the cipher's nonce size.
    pub iv: String,
    /// Base64 authentication tag; must decode to exactly the cipher's tag size.
    pub tag: String,
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error body. Sealed inside an [`Envelope`] on protected routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"unauthorized"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&crate::ProtocolError> for ErrorResponse {
    fn from(err: &crate::ProtocolError) -> Self {
        Self::new(err.code(), err.client_message())
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process is serving.
    pub status: String,
    /// Crate version of the running gateway.
    pub version: String,
}

// ---------------------------------------------------------------------------
// Server time
// ---------------------------------------------------------------------------

/// Plaintext of the sealed `GET /api/v1/time` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeResponse {
    /// Server clock in seconds since the epoch.
    pub server_time: i64,
}

//! Error taxonomy for the sealed request protocol.

use thiserror::Error;

/// Every way a sealed request or response can fail.
///
/// All variants are terminal for the current request; nothing is retried. The
/// client must re-issue a freshly timestamped, freshly signed request.
///
/// Variants map to HTTP status codes returned to callers:
/// - timestamp and signature failures → 401
/// - body, envelope and decryption failures → 400
/// - [`ProtocolError::SerializationFailed`], [`ProtocolError::EncryptionFailed`] → 500
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The timestamp header is missing or is not an integer.
    #[error("missing or malformed timestamp header")]
    MalformedTimestamp,

    /// The timestamp is older than the tolerance window allows.
    #[error("timestamp expired: {age_secs}s old, window is {window_secs}s")]
    ExpiredTimestamp { age_secs: i64, window_secs: u64 },

    /// The timestamp is further in the future than the configured skew allows.
    #[error("timestamp {ahead_secs}s in the future exceeds allowed skew of {max_skew_secs}s")]
    FutureTimestamp { ahead_secs: i64, max_skew_secs: u64 },

    /// The signature header is absent.
    #[error("missing signature header")]
    MissingSignature,

    /// The recomputed HMAC does not match the supplied signature.
    #[error("signature mismatch")]
    SignatureMismatch,

    /// The request body could not be read (I/O error or over the size limit).
    #[error("request body could not be read: {0}")]
    UnreadableBody(String),

    /// The body is not a well-formed `{data, iv, tag}` envelope.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The decoded `iv` does not have the cipher's nonce length.
    #[error("invalid nonce length: {0} bytes")]
    InvalidNonceLength(usize),

    /// Authentication failed while opening the envelope.
    #[error("decryption failed")]
    DecryptionFailed,

    /// A response payload could not be serialised.
    #[error("serialisation failed: {0}")]
    SerializationFailed(String),

    /// A payload could not be sealed.
    #[error("encryption failed")]
    EncryptionFailed,
}

impl ProtocolError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ProtocolError::MalformedTimestamp
            | ProtocolError::ExpiredTimestamp { .. }
            | ProtocolError::FutureTimestamp { .. }
            | ProtocolError::MissingSignature
            | ProtocolError::SignatureMismatch => 401,
            ProtocolError::UnreadableBody(_)
            | ProtocolError::MalformedEnvelope(_)
            | ProtocolError::InvalidNonceLength(_)
            | ProtocolError::DecryptionFailed => 400,
            ProtocolError::SerializationFailed(_) | ProtocolError::EncryptionFailed => 500,
        }
    }

    /// Short machine-readable error code (e.g. `"signature_mismatch"`).
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::MalformedTimestamp => "malformed_timestamp",
            ProtocolError::ExpiredTimestamp { .. } => "expired_timestamp",
            ProtocolError::FutureTimestamp { .. } => "future_timestamp",
            ProtocolError::MissingSignature => "missing_signature",
            ProtocolError::SignatureMismatch => "unauthorized",
            ProtocolError::UnreadableBody(_) => "unreadable_body",
            ProtocolError::MalformedEnvelope(_) => "malformed_envelope",
            ProtocolError::InvalidNonceLength(_) | ProtocolError::DecryptionFailed => {
                "undecryptable_body"
            }
            ProtocolError::SerializationFailed(_) | ProtocolError::EncryptionFailed => {
                "internal_error"
            }
        }
    }

    /// Human-readable description safe to expose to callers.
    ///
    /// Signature and decryption failures collapse to generic wording so that a
    /// caller cannot tell a bad key from a bad tag from bad ciphertext.
    pub fn client_message(&self) -> &'static str {
        match self {
            ProtocolError::MalformedTimestamp => "missing or malformed X-Timestamp header",
            ProtocolError::ExpiredTimestamp { .. } => {
                "timestamp has expired, check the device clock"
            }
            ProtocolError::FutureTimestamp { .. } => {
                "timestamp is in the future, check the device clock"
            }
            ProtocolError::MissingSignature => "missing X-Signature header",
            ProtocolError::SignatureMismatch => "request authentication failed",
            ProtocolError::UnreadableBody(_) => "request body could not be read",
            ProtocolError::MalformedEnvelope(_) => "request body is not a valid envelope",
            ProtocolError::InvalidNonceLength(_) | ProtocolError::DecryptionFailed => {
                "request body could not be decrypted"
            }
            ProtocolError::SerializationFailed(_) | ProtocolError::EncryptionFailed => {
                "internal server error"
            }
        }
    }
}

//! [`SharedSecret`]: the single symmetric key used for both HMAC and AES-GCM.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES key sizes accepted by the cipher (AES-128, AES-192, AES-256).
pub const VALID_KEY_LENS: [usize; 3] = [16, 24, 32];

/// Prefix marking a configured secret as base64-encoded binary key material.
pub const BASE64_PREFIX: &str = "base64:";

/// Errors produced while loading the shared secret at startup.
#[derive(Debug, Error)]
pub enum SecretError {
    /// The key material is not 16, 24 or 32 bytes long.
    #[error("shared secret has invalid length: expected 16, 24 or 32 bytes, got {0}")]
    InvalidLength(usize),

    /// A `base64:` secret did not decode.
    #[error("shared secret is not valid base64")]
    InvalidEncoding,
}

/// Key buffer that is overwritten with zeroes when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
struct KeyBytes(Box<[u8]>);

/// Process-wide shared secret.
///
/// Validated once at startup and immutable afterwards. Cloning shares the
/// same buffer; the bytes are zeroed when the last clone is dropped.
#[derive(Clone)]
pub struct SharedSecret {
    inner: Arc<KeyBytes>,
}

impl SharedSecret {
    /// Wrap raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::InvalidLength`] unless the slice is 16, 24 or 32 bytes.
    pub fn new(key_bytes: &[u8]) -> Result<Self, SecretError> {
        if !VALID_KEY_LENS.contains(&key_bytes.len()) {
            return Err(SecretError::InvalidLength(key_bytes.len()));
        }
        Ok(Self {
            inner: Arc::new(KeyBytes(key_bytes.into())),
        })
    }

    /// Parse a configured secret string.
    ///
    /// A value starting with `base64:` is decoded as standard base64; anything
    /// else is used verbatim as its UTF-8 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::InvalidEncoding`] for bad base64 and
    /// [`SecretError::InvalidLength`] for a key of the wrong size.
    pub fn from_config_value(value: &str) -> Result<Self, SecretError> {
        match value.strip_prefix(BASE64_PREFIX) {
            Some(encoded) => {
                let decoded = STANDARD
                    .decode(encoded.trim())
                    .map_err(|_| SecretError::InvalidEncoding)?;
                Self::new(&decoded)
            }
            None => Self::new(value.as_bytes()),
        }
    }

    /// Borrow the key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.inner.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret([REDACTED])")
    }
}

//! Client-side half of the protocol: seal and sign outgoing requests, open
//! sealed responses.

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

use crate::cipher;
use crate::error::ProtocolError;
use crate::protocol::Envelope;
use crate::secret::SharedSecret;
use crate::signer::{self, CanonicalRequest};

/// A request ready to send: header values plus the wire body.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    /// Value for the timestamp header.
    pub timestamp: String,
    /// Value for the signature header.
    pub signature: String,
    /// Envelope JSON, or empty when the request carries no body.
    pub body: Bytes,
}

/// Seals and signs requests under a [`SharedSecret`].
#[derive(Debug, Clone)]
pub struct RequestSigner {
    secret: SharedSecret,
}

impl RequestSigner {
    pub fn new(secret: SharedSecret) -> Self {
        Self { secret }
    }

    /// Seal `payload` (if any) and sign the request.
    ///
    /// `path_and_query` is split at the first `?`; the query part is sorted
    /// the same way the gateway sorts it.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::SerializationFailed`] if `payload` cannot be
    /// serialised and [`ProtocolError::EncryptionFailed`] if sealing fails.
    pub fn sign_request<T: Serialize + ?Sized>(
        &self,
        method: &str,
        path_and_query: &str,
        payload: Option<&T>,
        timestamp: i64,
    ) -> Result<SignedRequest, ProtocolError> {
        let body = match payload {
            Some(payload) => {
                let plaintext = serde_json::to_vec(payload)
                    .map_err(|e| ProtocolError::SerializationFailed(e.to_string()))?;
                let envelope = cipher::encrypt(&plaintext, self.secret.as_bytes())?;
                let wire = serde_json::to_vec(&envelope)
                    .map_err(|e| ProtocolError::SerializationFailed(e.to_string()))?;
                Bytes::from(wire)
            }
            None => Bytes::new(),
        };

        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path_and_query, None),
        };
        let timestamp = timestamp.to_string();
        let canonical = CanonicalRequest {
            timestamp: &timestamp,
            method,
            path,
            query,
            body: &body,
        }
        .to_bytes();
        let signature = signer::sign(self.secret.as_bytes(), &canonical);

        Ok(SignedRequest {
            timestamp,
            signature,
            body,
        })
    }

    /// Open a sealed response body and deserialise the plaintext JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedEnvelope`] if `body` is not an envelope
    /// or the plaintext is not the expected JSON, and the cipher's errors otherwise.
    pub fn open_response<T: DeserializeOwned>(&self, body: &[u8]) -> Result<T, ProtocolError> {
        let envelope: Envelope = serde_json::from_slice(body)
            .map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))?;
        let plaintext = cipher::decrypt(&envelope, self.secret.as_bytes())?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))
    }
}

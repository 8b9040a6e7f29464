//! Response Envelope Writer: every response on a protected route leaves sealed.
//!
//! Failure is two-tiered. If the intended payload cannot be serialised or
//! sealed, a sealed generic 500 is sent instead. If that cannot be sealed
//! either, a plaintext generic 500 goes out. That last step is the only place
//! the protocol emits plaintext, so a client always gets a well-formed reply.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::{cipher, protocol::ErrorResponse, Envelope, ProtocolError, SharedSecret};
use serde::Serialize;
use tracing::error;

/// Turns plaintext bytes into an [`Envelope`].
#[cfg_attr(test, mockall::automock)]
pub trait Sealer: Send + Sync {
    fn seal(&self, plaintext: &[u8]) -> Result<Envelope, ProtocolError>;
}

impl Sealer for SharedSecret {
    fn seal(&self, plaintext: &[u8]) -> Result<Envelope, ProtocolError> {
        cipher::encrypt(plaintext, self.as_bytes())
    }
}

/// Serialises, seals and emits responses.
#[derive(Clone)]
pub struct EnvelopeWriter {
    sealer: Arc<dyn Sealer>,
}

impl EnvelopeWriter {
    pub fn new(sealer: Arc<dyn Sealer>) -> Self {
        Self { sealer }
    }

    /// Send `body` as JSON sealed in an envelope with the given status.
    pub fn respond<T: Serialize + ?Sized>(&self, status: StatusCode, body: &T) -> Response {
        match self.seal_json(body) {
            Ok(envelope) => (status, Json(envelope)).into_response(),
            Err(e) => {
                error!(error = %e, status = status.as_u16(), "failed to seal response");
                self.internal_error()
            }
        }
    }

    /// Send a protocol failure with its status and client-safe message.
    pub fn reject(&self, err: &ProtocolError) -> Response {
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.respond(status, &ErrorResponse::from(err))
    }

    fn internal_error(&self) -> Response {
        let body = ErrorResponse::new("internal_error", "internal server error");
        match self.seal_json(&body) {
            Ok(envelope) => (StatusCode::INTERNAL_SERVER_ERROR, Json(envelope)).into_response(),
            Err(e) => {
                error!(error = %e, "failed to seal error response; sending plaintext");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }

    fn seal_json<T: Serialize + ?Sized>(&self, body: &T) -> Result<Envelope, ProtocolError> {
        let plaintext = serde_json::to_vec(body)
            .map_err(|e| ProtocolError::SerializationFailed(e.to_string()))?;
        self.sealer.seal(&plaintext)
    }
}

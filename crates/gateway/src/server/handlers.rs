//! Axum request handlers.
//!
//! The `/api/v1` handlers stand in for the business layer: they run on the
//! plaintext the pipeline produced and answer through the envelope writer.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::{ErrorResponse, HealthResponse, TimeResponse};
use serde_json::Value;

use super::state::AppState;

/// `POST /api/v1/echo`: return the decrypted JSON body, sealed.
pub async fn echo(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(value)) => state.writer.respond(StatusCode::OK, &value),
        Err(rejection) => {
            let err = ErrorResponse::new("bad_request", rejection.body_text());
            state.writer.respond(StatusCode::BAD_REQUEST, &err)
        }
    }
}

/// `GET /api/v1/time`: the server clock, sealed, so clients can detect skew.
pub async fn server_time(State(state): State<AppState>) -> Response {
    let body = TimeResponse {
        server_time: state.clock.now_unix(),
    };
    state.writer.respond(StatusCode::OK, &body)
}

/// `GET /health`: liveness check. Not part of the sealed protocol.
pub async fn health() -> Response {
    let body = HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}

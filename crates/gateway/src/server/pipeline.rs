//! Request Pipeline: replay guard → signature → envelope decryption → handler.
//!
//! Each stage is a function returning `Result<_, ProtocolError>`; the first
//! failure ends the request and is answered through the [`EnvelopeWriter`].
//! The body is buffered once and the same bytes are handed to every stage.
//! Handlers receive the decrypted plaintext as their request body and never
//! see ciphertext.
//!
//! [`EnvelopeWriter`]: super::envelope::EnvelopeWriter

use axum::{
    body::{Body, Bytes},
    extract::{OriginalUri, Request, State},
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        HeaderMap, HeaderValue, Method,
    },
    middleware::Next,
    response::Response,
};
use common::{
    cipher,
    protocol::{SIGNATURE_HEADER, TIMESTAMP_HEADER},
    replay::ReplayGuard,
    signer::{self, CanonicalRequest},
    Envelope, ProtocolError,
};
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use super::state::AppState;

/// Methods whose body is buffered, signed and decrypted.
const BODY_METHODS: [Method; 4] = [Method::POST, Method::PUT, Method::PATCH, Method::DELETE];

/// Axum middleware wrapping every protected route.
pub async fn authenticate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let span = info_span!(
        "sealed_request",
        request_id = %Uuid::new_v4(),
        method = %request.method(),
        path = %request.uri().path(),
    );

    async move {
        match open_request(&state, request).await {
            Ok(request) => next.run(request).await,
            Err(err) => {
                warn!(code = err.code(), error = %err, "request rejected");
                state.writer.reject(&err)
            }
        }
    }
    .instrument(span)
    .await
}

/// Run all stages and rebuild the request around the decrypted body.
pub(crate) async fn open_request(
    state: &AppState,
    request: Request,
) -> Result<Request, ProtocolError> {
    let (mut parts, body) = request.into_parts();

    let timestamp = check_freshness(&state.guard, &parts.headers, state.clock.now_unix())?;

    let wire = buffer_body(&parts.method, body, state.max_body_bytes).await?;

    // Nested routers strip their prefix; sign over the path the client sent.
    let uri = parts
        .extensions
        .get::<OriginalUri>()
        .map(|original| original.0.clone())
        .unwrap_or_else(|| parts.uri.clone());
    let canonical = CanonicalRequest {
        timestamp: &timestamp,
        method: parts.method.as_str(),
        path: uri.path(),
        query: uri.query(),
        body: &wire,
    }
    .to_bytes();
    verify_signature(state.secret.as_bytes(), &canonical, &parts.headers)?;

    let plaintext = open_body(&wire, state.secret.as_bytes())?;
    debug!(
        wire_bytes = wire.len(),
        plaintext_bytes = plaintext.len(),
        "request authenticated"
    );

    parts
        .headers
        .insert(CONTENT_LENGTH, HeaderValue::from(plaintext.len()));
    if !plaintext.is_empty() {
        parts
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    Ok(Request::from_parts(parts, Body::from(plaintext)))
}

/// Stage 1: parse the timestamp header and apply the replay window.
///
/// Returns the header value exactly as sent, for the canonical string.
pub(crate) fn check_freshness(
    guard: &ReplayGuard,
    headers: &HeaderMap,
    now: i64,
) -> Result<String, ProtocolError> {
    let raw = header_str(headers, TIMESTAMP_HEADER);
    guard.check_header(raw, now)?;
    Ok(raw.unwrap_or_default().to_owned())
}

/// Read the whole body into memory, once. Methods that carry no body yield
/// an empty buffer and their body, if any, is dropped.
pub(crate) async fn buffer_body(
    method: &Method,
    body: Body,
    limit: usize,
) -> Result<Bytes, ProtocolError> {
    if !BODY_METHODS.contains(method) {
        return Ok(Bytes::new());
    }
    axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| ProtocolError::UnreadableBody(e.to_string()))
}

/// Stage 2: the signature header must match the canonical bytes.
pub(crate) fn verify_signature(
    key: &[u8],
    canonical: &[u8],
    headers: &HeaderMap,
) -> Result<(), ProtocolError> {
    let supplied = header_str(headers, SIGNATURE_HEADER)
        .filter(|s| !s.is_empty())
        .ok_or(ProtocolError::MissingSignature)?;
    if !signer::verify(key, canonical, supplied) {
        return Err(ProtocolError::SignatureMismatch);
    }
    Ok(())
}

/// Stage 3: parse and open the envelope. An empty body stays empty.
pub(crate) fn open_body(wire: &[u8], key: &[u8]) -> Result<Bytes, ProtocolError> {
    if wire.is_empty() {
        return Ok(Bytes::new());
    }
    let envelope: Envelope = serde_json::from_slice(wire)
        .map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))?;
    cipher::decrypt(&envelope, key).map(Bytes::from)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        extract::Path,
        http::StatusCode,
        routing::{get, post},
        Router,
    };
    use common::{
        client::{RequestSigner, SignedRequest},
        protocol::ErrorResponse,
        SharedSecret,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::server::{
        envelope::{EnvelopeWriter, MockSealer},
        state::MockClock,
    };

    const SECRET: &[u8] = b"1234567890123456";
    const T: i64 = 1_700_000_000;

    fn state_at(now: i64) -> AppState {
        let mut clock = MockClock::new();
        clock.expect_now_unix().return_const(now);
        AppState::new(SharedSecret::new(SECRET).unwrap(), ReplayGuard::new(300))
            .with_clock(Arc::new(clock))
    }

    fn client() -> RequestSigner {
        RequestSigner::new(SharedSecret::new(SECRET).unwrap())
    }

    /// Router whose handler reports exactly what it received.
    fn inspect_router(state: AppState) -> Router {
        async fn inspect(method: Method, headers: HeaderMap, body: Bytes) -> axum::Json<Value> {
            axum::Json(json!({
                "method": method.as_str(),
                "content_type": headers
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok()),
                "body": String::from_utf8_lossy(&body),
            }))
        }
        async fn named(Path(name): Path<String>) -> String {
            name
        }
        Router::new()
            .route(
                "/api/v1/stores",
                post(inspect)
                    .get(inspect)
                    .put(inspect)
                    .patch(inspect)
                    .delete(inspect),
            )
            .route("/api/v1/stores/:name", get(named))
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                authenticate,
            ))
            .with_state(state)
    }

    fn build_request(method: Method, uri: &str, signed: &SignedRequest) -> Request {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header(TIMESTAMP_HEADER, &signed.timestamp)
            .header(SIGNATURE_HEADER, &signed.signature)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(signed.body.clone()))
            .unwrap()
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn sealed_error(resp: Response) -> ErrorResponse {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        client().open_response(&bytes).unwrap()
    }

    #[tokio::test]
    async fn handler_receives_plaintext() {
        let signed = client()
            .sign_request("POST", "/api/v1/stores", Some(&json!({"name": "x"})), T)
            .unwrap();
        let resp = inspect_router(state_at(T))
            .oneshot(build_request(Method::POST, "/api/v1/stores", &signed))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["body"], r#"{"name":"x"}"#);
        assert_eq!(body["content_type"], "application/json");
    }

    #[tokio::test]
    async fn bodiless_get_with_sorted_query_passes() {
        let signed = client()
            .sign_request::<Value>("GET", "/api/v1/stores?b=2&a=1", None, T)
            .unwrap();
        // Same pairs, different order on the wire.
        let resp = inspect_router(state_at(T))
            .oneshot(build_request(Method::GET, "/api/v1/stores?a=1&b=2", &signed))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["body"], "");
    }

    #[tokio::test]
    async fn delete_body_is_verified_and_decrypted() {
        let signed = client()
            .sign_request("DELETE", "/api/v1/stores", Some(&json!({"id": 9})), T)
            .unwrap();
        let resp = inspect_router(state_at(T))
            .oneshot(build_request(Method::DELETE, "/api/v1/stores", &signed))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["body"], r#"{"id":9}"#);
    }

    #[tokio::test]
    async fn patch_body_is_verified_and_decrypted() {
        let signed = client()
            .sign_request("PATCH", "/api/v1/stores", Some(&json!({"open": true})), T)
            .unwrap();
        let resp = inspect_router(state_at(T))
            .oneshot(build_request(Method::PATCH, "/api/v1/stores", &signed))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["method"], "PATCH");
        assert_eq!(body["body"], r#"{"open":true}"#);
    }

    #[tokio::test]
    async fn tampered_patch_body_is_unauthorized() {
        let mut signed = client()
            .sign_request("PATCH", "/api/v1/stores", Some(&json!({"open": true})), T)
            .unwrap();
        let other = client()
            .sign_request("PATCH", "/api/v1/stores", Some(&json!({"open": false})), T)
            .unwrap();
        signed.body = other.body;
        let resp = inspect_router(state_at(T))
            .oneshot(build_request(Method::PATCH, "/api/v1/stores", &signed))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(sealed_error(resp).await.code, "unauthorized");
    }

    #[tokio::test]
    async fn escaped_path_is_signed_decoded() {
        let canonical = format!("{T}GET/api/v1/stores/café");
        let signed = SignedRequest {
            timestamp: T.to_string(),
            signature: signer::sign(SECRET, canonical.as_bytes()),
            body: Bytes::new(),
        };
        let resp = inspect_router(state_at(T))
            .oneshot(build_request(Method::GET, "/api/v1/stores/caf%C3%A9", &signed))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], "café".as_bytes());
    }

    #[tokio::test]
    async fn client_signs_escaped_path_the_same_way() {
        let signed = client()
            .sign_request::<Value>("GET", "/api/v1/stores/caf%C3%A9", None, T)
            .unwrap();
        let resp = inspect_router(state_at(T))
            .oneshot(build_request(Method::GET, "/api/v1/stores/caf%C3%A9", &signed))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn replay_window_boundary() {
        for (issued, expected) in [
            (T - 300, StatusCode::OK),
            (T - 301, StatusCode::UNAUTHORIZED),
        ] {
            let signed = client()
                .sign_request::<Value>("GET", "/api/v1/stores", None, issued)
                .unwrap();
            let resp = inspect_router(state_at(T))
                .oneshot(build_request(Method::GET, "/api/v1/stores", &signed))
                .await
                .unwrap();
            assert_eq!(resp.status(), expected, "issued at {issued}");
        }
    }

    #[tokio::test]
    async fn expired_request_rejected_with_sealed_error() {
        let signed = client()
            .sign_request::<Value>("GET", "/api/v1/stores", None, T - 3600)
            .unwrap();
        let resp = inspect_router(state_at(T))
            .oneshot(build_request(Method::GET, "/api/v1/stores", &signed))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(sealed_error(resp).await.code, "expired_timestamp");
    }

    #[tokio::test]
    async fn rejection_is_plaintext_when_sealing_fails() {
        let mut sealer = MockSealer::new();
        sealer
            .expect_seal()
            .times(2)
            .returning(|_| Err(ProtocolError::EncryptionFailed));
        let state = state_at(T).with_writer(EnvelopeWriter::new(Arc::new(sealer)));

        let signed = client()
            .sign_request::<Value>("GET", "/api/v1/stores", None, T - 3600)
            .unwrap();
        let resp = inspect_router(state)
            .oneshot(build_request(Method::GET, "/api/v1/stores", &signed))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorResponse = serde_json::from_value(body_json(resp).await).unwrap();
        assert_eq!(body.code, "internal_error");
    }

    #[tokio::test]
    async fn missing_timestamp_is_unauthorized() {
        let req = axum::http::Request::builder()
            .method(Method::GET)
            .uri("/api/v1/stores")
            .header(SIGNATURE_HEADER, "00")
            .body(Body::empty())
            .unwrap();
        let resp = inspect_router(state_at(T)).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(sealed_error(resp).await.code, "malformed_timestamp");
    }

    #[tokio::test]
    async fn missing_signature_is_unauthorized() {
        let req = axum::http::Request::builder()
            .method(Method::GET)
            .uri("/api/v1/stores")
            .header(TIMESTAMP_HEADER, T.to_string())
            .body(Body::empty())
            .unwrap();
        let resp = inspect_router(state_at(T)).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(sealed_error(resp).await.code, "missing_signature");
    }

    #[tokio::test]
    async fn tampered_body_fails_signature() {
        let mut signed = client()
            .sign_request("POST", "/api/v1/stores", Some(&json!({"name": "x"})), T)
            .unwrap();
        let other = client()
            .sign_request("POST", "/api/v1/stores", Some(&json!({"name": "y"})), T)
            .unwrap();
        signed.body = other.body;
        let resp = inspect_router(state_at(T))
            .oneshot(build_request(Method::POST, "/api/v1/stores", &signed))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(sealed_error(resp).await.code, "unauthorized");
    }

    #[tokio::test]
    async fn signed_non_envelope_body_is_bad_request() {
        let body = br#"{"name":"x"}"#;
        let canonical = CanonicalRequest {
            timestamp: "1700000000",
            method: "POST",
            path: "/api/v1/stores",
            query: None,
            body,
        }
        .to_bytes();
        let signed = SignedRequest {
            timestamp: T.to_string(),
            signature: signer::sign(SECRET, &canonical),
            body: Bytes::from_static(body),
        };
        let resp = inspect_router(state_at(T))
            .oneshot(build_request(Method::POST, "/api/v1/stores", &signed))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(sealed_error(resp).await.code, "malformed_envelope");
    }

    #[tokio::test]
    async fn envelope_under_other_key_is_bad_request() {
        let envelope = cipher::encrypt(b"{}", &[9u8; 32]).unwrap();
        let body = serde_json::to_vec(&envelope).unwrap();
        let canonical = CanonicalRequest {
            timestamp: "1700000000",
            method: "POST",
            path: "/api/v1/stores",
            query: None,
            body: &body,
        }
        .to_bytes();
        let signed = SignedRequest {
            timestamp: T.to_string(),
            signature: signer::sign(SECRET, &canonical),
            body: Bytes::from(body),
        };
        let resp = inspect_router(state_at(T))
            .oneshot(build_request(Method::POST, "/api/v1/stores", &signed))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(sealed_error(resp).await.code, "undecryptable_body");
    }

    #[tokio::test]
    async fn oversized_body_is_bad_request() {
        let big = "x".repeat(4096);
        let signed = client()
            .sign_request("POST", "/api/v1/stores", Some(&json!({"blob": big})), T)
            .unwrap();
        let mut state = state_at(T);
        state.max_body_bytes = 1024;
        let resp = inspect_router(state)
            .oneshot(build_request(Method::POST, "/api/v1/stores", &signed))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(sealed_error(resp).await.code, "unreadable_body");
    }

    #[test]
    fn shared_secret_scenario() {
        let envelope = cipher::encrypt(br#"{"name":"x"}"#, SECRET).unwrap();
        let wire = serde_json::to_vec(&envelope).unwrap();
        let canonical = CanonicalRequest {
            timestamp: "1700000000",
            method: "POST",
            path: "/api/v1/stores",
            query: None,
            body: &wire,
        }
        .to_bytes();

        let mut headers = HeaderMap::new();
        headers.insert(TIMESTAMP_HEADER, HeaderValue::from_static("1700000000"));
        headers.insert(
            SIGNATURE_HEADER,
            HeaderValue::from_str(&signer::sign(b"s3cr3t", &canonical)).unwrap(),
        );

        let guard = ReplayGuard::new(300);
        assert_eq!(check_freshness(&guard, &headers, T).unwrap(), "1700000000");
        assert_eq!(verify_signature(b"s3cr3t", &canonical, &headers), Ok(()));
        assert_eq!(
            verify_signature(b"wrong", &canonical, &headers),
            Err(ProtocolError::SignatureMismatch)
        );
    }

    #[test]
    fn empty_wire_body_stays_empty() {
        assert!(open_body(b"", SECRET).unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_body_is_not_buffered() {
        let bytes = buffer_body(&Method::GET, Body::from("ignored"), 1024)
            .await
            .unwrap();
        assert!(bytes.is_empty());
    }
}

//! Axum middleware layers applied to the whole router: host restriction and
//! security response headers. The protocol middleware lives in
//! [`super::pipeline`].

use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{
        header::{
            HOST, STRICT_TRANSPORT_SECURITY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
            X_XSS_PROTECTION,
        },
        HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::ErrorResponse;
use tracing::warn;

use super::state::AppState;

/// Default per-request timeout applied to all routes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const HSTS_VALUE: &str = "max-age=31536000; includeSubDomains";

/// Refuse requests for any host other than the configured one.
///
/// Comparison ignores case and any port. With no domain configured every
/// request passes.
pub async fn check_host(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(allowed) = state.allowed_domain.as_deref() else {
        return next.run(request).await;
    };

    let host = request
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().host())
        .map(strip_port)
        .unwrap_or_default();

    if !host.eq_ignore_ascii_case(allowed) {
        warn!(host, "request for disallowed host");
        let err = ErrorResponse::new("forbidden", "access denied for this host");
        return (StatusCode::FORBIDDEN, Json(err)).into_response();
    }
    next.run(request).await
}

/// Add security headers to every response.
pub async fn secure_headers(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
    if state.use_https {
        headers.insert(STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS_VALUE));
    }
    response
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literal without a port.
    if host.ends_with(']') {
        return host;
    }
    host.rsplit_once(':').map_or(host, |(name, _)| name)
}

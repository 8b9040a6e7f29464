//! Axum router construction.

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};

use super::{handlers, middleware, pipeline, state::AppState};

/// Build the application [`Router`] with all routes and middleware attached.
///
/// Routes under `/api/v1` sit behind the sealed request pipeline; `/health`
/// and the 404 fallback do not.
pub fn build(state: AppState) -> Router {
    let sealed = Router::new()
        .route("/api/v1/echo", post(handlers::echo))
        .route("/api/v1/time", get(handlers::server_time))
        .route_layer(from_fn_with_state(state.clone(), pipeline::authenticate));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(sealed)
        .fallback(handlers::not_found)
        .layer(from_fn_with_state(state.clone(), middleware::check_host))
        .layer(from_fn_with_state(state.clone(), middleware::secure_headers))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(middleware::REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
        .with_state(state)
}

//! Axum HTTP(S) server, routing, and middleware.
//!
//! # Responsibilities
//! - Run the sealed request pipeline in front of every `/api/v1` route.
//! - Seal every protected response through the envelope writer.
//! - Apply host restriction, security headers, tracing, timeout and compression.
//! - Serve over plain TCP or rustls.

pub mod envelope;
pub mod handlers;
pub mod middleware;
pub mod pipeline;
pub mod router;
pub mod state;
pub mod tls;

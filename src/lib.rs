//! Typerace server - real-time multiplayer typing races
//!
//! This crate provides the backend for a typing race game:
//! - Named rooms that players create, join and leave over a `WebSocket`
//! - Readiness tracking and race start once every player is ready
//! - Live progress fan-out and finishing order, with a tie-break for players who time out
//! - The race text endpoint and the static page shells

pub mod config;
pub mod error;
pub mod hub;
pub mod lobby;
pub mod protocol;
pub mod routes;
pub mod state;
pub mod texts;

use std::time::Duration;

use axum::Router;
use axum::http::Request;
use axum::response::Response;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::config::Environment;
use crate::state::AppState;

/// Build the full application router with all middleware layers.
pub fn build_app(state: AppState) -> Router {
    let cors = if state.config.environment == Environment::Production {
        CorsLayer::new()
    } else {
        CorsLayer::permissive()
    };

    let trace = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                status_code = tracing::field::Empty,
            )
        })
        .on_response(|response: &Response, latency: Duration, span: &Span| {
            span.record("status_code", response.status().as_u16());
            tracing::info!(latency_ms = latency.as_millis(), "response");
        });

    routes::router(&state)
        .with_state(state)
        .layer(cors)
        .layer(trace)
}

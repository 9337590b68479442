use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    rooms: usize,
    online: usize,
}

/// Health check endpoint handler
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (rooms, online) = {
        let lobby = state.lobby.lock().await;
        (lobby.room_count(), lobby.online_count())
    };

    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        rooms,
        online,
    };

    (StatusCode::OK, Json(response))
}

/// Register health check routes
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

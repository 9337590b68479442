use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::services::ServeFile;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Serialize)]
struct TextResponse {
    text: String,
}

/// Build the game route group: `/game/...`
pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route_service("/", ServeFile::new(state.config.static_dir.join("html/game.html")))
        .route("/texts/{id}", get(get_text))
}

/// `GET /game/texts/{id}` — Race text announced by `START_TIMER`.
async fn get_text(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TextResponse>, AppError> {
    let id = id.parse::<usize>().map_err(|_| {
        AppError::BadRequest(format!("Text id must be a non-negative integer, got {id:?}."))
    })?;
    let text = state
        .texts
        .get(id)
        .ok_or_else(|| AppError::NotFound(format!("No text with id {id}.")))?;

    Ok(Json(TextResponse {
        text: text.to_string(),
    }))
}

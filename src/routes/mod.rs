mod game;
mod health;
mod login;
mod ws;

use axum::Router;

use crate::state::AppState;

pub use ws::schedule_race_deadline;

/// Build the complete application router.
///
/// Structure:
/// - `GET /health` — liveness plus room and presence counts
/// - `GET /login`, `GET /game` — static page shells
/// - `GET /game/texts/{id}` — race text by index
/// - `GET /ws?username=...` — real-time lobby channel
pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(ws::router())
        .nest("/login", login::router(state))
        .nest("/game", game::router(state))
}

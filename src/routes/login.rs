use axum::Router;
use tower_http::services::ServeFile;

use crate::state::AppState;

/// Build the login route group: `/login`
pub fn router(state: &AppState) -> Router<AppState> {
    Router::new().route_service(
        "/",
        ServeFile::new(state.config.static_dir.join("html/login.html")),
    )
}

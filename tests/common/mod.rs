#![allow(dead_code)]
#![allow(clippy::expect_used)]

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use typerace_server::config::{Config, Environment, GameSettings};
use typerace_server::state::AppState;

/// Configuration for tests: loopback, ephemeral port, pages from the crate's `public/`.
pub fn test_config(game: GameSettings) -> Config {
    Config {
        server_host: std::net::IpAddr::from([127, 0, 0, 1]),
        server_port: 0,
        environment: Environment::Development,
        log_level: "warn".to_string(),
        static_dir: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/public")),
        game,
    }
}

pub fn test_state() -> AppState {
    AppState::new(test_config(GameSettings::default()))
}

pub fn test_app(state: AppState) -> Router {
    typerace_server::build_app(state)
}

/// Test helper: send a GET request to the app and return (status, body).
pub async fn get(app: &Router, uri: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap_or_default();

    let response = app.clone().oneshot(request).await.unwrap_or_default();

    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .map(http_body_util::Collected::to_bytes)
        .unwrap_or_default();
    let body_str = String::from_utf8(body.to_vec()).unwrap_or_default();

    (status, body_str)
}

/// Serve the app on an ephemeral loopback port and return its address.
pub async fn spawn_server(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Failed to get local addr");
    let app = typerace_server::build_app(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

//! HTTP surface: health, race texts and static page shells.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

mod common;

use axum::http::StatusCode;

#[tokio::test]
async fn health_returns_counts() {
    let app = common::test_app(common::test_state());
    let (status, body) = common::get(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["rooms"], 0);
    assert_eq!(json["online"], 0);
}

#[tokio::test]
async fn text_by_index() {
    let app = common::test_app(common::test_state());
    let (status, body) = common::get(&app, "/game/texts/0").await;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
    assert!(
        json["text"]
            .as_str()
            .unwrap_or_default()
            .starts_with("Text for typing #1")
    );
}

#[tokio::test]
async fn text_out_of_range_is_not_found() {
    let app = common::test_app(common::test_state());
    let (status, body) = common::get(&app, "/game/texts/99").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
    assert_eq!(json["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn text_with_bad_id_is_rejected() {
    let app = common::test_app(common::test_state());
    for uri in ["/game/texts/abc", "/game/texts/-1"] {
        let (status, body) = common::get(&app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }
}

#[tokio::test]
async fn page_shells_are_served() {
    let app = common::test_app(common::test_state());

    let (status, body) = common::get(&app, "/login").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<form"));

    let (status, body) = common::get(&app, "/game").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<html"));
    assert!(!body.contains("/javascript/"), "game shell must not load unserved assets");
}

use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::error::AppError;
use crate::lobby::{Gateway, RaceStart, Session};
use crate::protocol::{ClientEvent, ServerEvent};
use crate::state::AppState;

/// Longest accepted display name, in characters.
const MAX_USERNAME_LEN: usize = 32;

#[derive(Deserialize)]
struct WsQueryParams {
    username: String,
}

/// Build the real-time route: `/ws`
pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

/// `GET /ws?username=NAME` — Upgrade to `WebSocket` under a display name.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsQueryParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let username = params.username.trim().to_string();
    if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
        return Err(AppError::BadRequest(format!(
            "Username must be between 1 and {MAX_USERNAME_LEN} characters."
        )));
    }

    Ok(ws.on_upgrade(move |socket| handle_ws_connection(state, username, socket)))
}

/// Handle a single `WebSocket` connection for its whole lifetime.
async fn handle_ws_connection(state: AppState, username: String, socket: WebSocket) {
    let session = Session::new(&username);
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    state.hub.register(session.connection_id, tx);
    tracing::info!(
        connection_id = %session.connection_id,
        username = %session.username,
        "Client connected"
    );

    state.lobby.lock().await.connect(&session, &state.hub);

    // Spawn task to forward outbound messages to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sink.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // Process inbound messages
    while let Some(Ok(msg)) = ws_stream.next().await {
        match msg {
            Message::Text(text) => handle_ws_message(&state, &session, text.as_str()).await,
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Cleanup on disconnect
    let started = state.lobby.lock().await.disconnect(&session, &state.hub);
    if let Some(start) = started {
        schedule_race_deadline(&state, start);
    }
    state.hub.unregister(session.connection_id);
    send_task.abort();

    tracing::info!(
        connection_id = %session.connection_id,
        username = %session.username,
        "Client disconnected"
    );
}

/// Decode one inbound frame and apply it to the lobby.
///
/// Nothing here propagates: malformed frames and rejected events are logged, conflicts are
/// reported back to the sender as a message.
async fn handle_ws_message(state: &AppState, session: &Session, text: &str) {
    let event = match ClientEvent::from_frame(text) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(username = %session.username, %err, "Malformed client event");
            return;
        }
    };
    let event = match event.validated() {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(username = %session.username, %err, "Rejected client event");
            return;
        }
    };

    let result = state.lobby.lock().await.handle(session, event, &state.hub);
    match result {
        Ok(Some(start)) => schedule_race_deadline(state, start),
        Ok(None) => {}
        Err(err) if err.is_user_facing() => {
            tracing::debug!(username = %session.username, %err, "Conflict");
            state.hub.reply(
                session.connection_id,
                &ServerEvent::ShowMessage {
                    message: err.to_string(),
                },
            );
        }
        Err(err) => {
            tracing::debug!(username = %session.username, %err, "Stale event ignored");
        }
    }
}

/// Close the race on the server once its deadline passes, whatever the clients report.
pub fn schedule_race_deadline(state: &AppState, start: RaceStart) {
    let lobby = state.lobby.clone();
    let hub = state.hub.clone();
    tokio::spawn(async move {
        tokio::time::sleep(start.deadline).await;
        let closed = lobby
            .lock()
            .await
            .expire_race(&start.room, start.race_id, &hub);
        if !closed {
            tracing::debug!(room = %start.room, race_id = %start.race_id, "Race deadline was stale");
        }
    });
}

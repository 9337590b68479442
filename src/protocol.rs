//! Wire format of the real-time channel.
//!
//! Every frame is a JSON text message tagged as `{ "type": "...", "payload": { ... } }`.
//! Payload field names are camelCase.

use serde::{Deserialize, Serialize};

use crate::lobby::LobbyError;

/// Longest accepted room name, in characters.
pub const MAX_ROOM_NAME_LEN: usize = 64;

/// Events sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    JoinRoom {
        room_name: String,
    },
    CreateRoom {
        room_name: String,
    },
    /// Leave the current room. The name is optional; membership decides which room is left.
    Exit {
        #[serde(default)]
        room_name: Option<String>,
    },
    ChangeReadiness {
        room_name: String,
    },
    SetMeProgress {
        percent: u32,
        room_name: String,
    },
    /// The client's own race clock ran out before it finished the text.
    EndTime {
        percent: u32,
        room_name: String,
    },
    RestartRoom {
        room_name: String,
    },
}

impl ClientEvent {
    /// Decode one text frame. A missing or `null` payload reads as an empty object, so
    /// events whose fields are all optional (`EXIT`) may omit it.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for malformed JSON, unknown types or missing fields.
    pub fn from_frame(text: &str) -> Result<Self, serde_json::Error> {
        let mut frame: serde_json::Value = serde_json::from_str(text)?;
        if let Some(fields) = frame.as_object_mut() {
            let payload = fields
                .entry("payload")
                .or_insert(serde_json::Value::Null);
            if payload.is_null() {
                *payload = serde_json::Value::Object(serde_json::Map::new());
            }
        }
        serde_json::from_value(frame)
    }

    /// Normalize and check the payload before it reaches the lobby.
    ///
    /// Room names are trimmed; blank or overlong names and progress above 100% are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::InvalidEvent`] describing the first offending field.
    pub fn validated(self) -> Result<Self, LobbyError> {
        let event = match self {
            Self::JoinRoom { room_name } => Self::JoinRoom {
                room_name: room_name_of(&room_name)?,
            },
            Self::CreateRoom { room_name } => Self::CreateRoom {
                room_name: room_name_of(&room_name)?,
            },
            Self::Exit { room_name } => Self::Exit {
                room_name: room_name
                    .filter(|name| !name.trim().is_empty())
                    .map(|name| room_name_of(&name))
                    .transpose()?,
            },
            Self::ChangeReadiness { room_name } => Self::ChangeReadiness {
                room_name: room_name_of(&room_name)?,
            },
            Self::SetMeProgress { percent, room_name } => Self::SetMeProgress {
                percent: percent_of(percent)?,
                room_name: room_name_of(&room_name)?,
            },
            Self::EndTime { percent, room_name } => Self::EndTime {
                percent: percent_of(percent)?,
                room_name: room_name_of(&room_name)?,
            },
            Self::RestartRoom { room_name } => Self::RestartRoom {
                room_name: room_name_of(&room_name)?,
            },
        };
        Ok(event)
    }
}

fn room_name_of(raw: &str) -> Result<String, LobbyError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(LobbyError::InvalidEvent("room name must not be blank".to_string()));
    }
    if name.chars().count() > MAX_ROOM_NAME_LEN {
        return Err(LobbyError::InvalidEvent(format!(
            "room name must be at most {MAX_ROOM_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

fn percent_of(percent: u32) -> Result<u32, LobbyError> {
    if percent > 100 {
        return Err(LobbyError::InvalidEvent(format!(
            "progress {percent} is above 100%"
        )));
    }
    Ok(percent)
}

/// A player as shown inside a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub name: String,
    pub is_ready: bool,
}

/// Public state of a room, as listed in `RENDER_ROOMS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub hidden: bool,
    pub in_progress: bool,
    pub players: Vec<PlayerView>,
}

/// `(roomName, snapshot)` pairs, serialized as two-element arrays.
pub type RoomListing = Vec<(String, RoomSnapshot)>;

/// Events sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Another connection already uses this display name.
    ExistingUser,
    ShowMessage {
        message: String,
    },
    RenderRooms(RoomListing),
    UpdateUsersNumber {
        room_name: String,
        count: usize,
    },
    JoinRoomDone {
        room_name: String,
    },
    UpdateRoom {
        players: Vec<PlayerView>,
    },
    AddToRoom {
        username: String,
        ready: bool,
    },
    RemoveFromRoom {
        username: String,
    },
    ChangeReadyStatus {
        username: String,
        ready: bool,
    },
    StartTimer {
        countdown_seconds: u64,
        race_seconds: u64,
        text_index: usize,
    },
    SetProgress {
        username: String,
        progress: u32,
    },
    /// Final ranking, first finisher first.
    EndGame {
        winners: Vec<String>,
    },
    UpdateAfterRestart {
        players: Vec<PlayerView>,
    },
}

use std::fmt;

/// Why a client event could not be applied to the lobby.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyError {
    /// A room with this name already exists.
    RoomNameTaken(String),
    /// The room is full or its race is running.
    RoomUnavailable(String),
    /// The user already occupies a room and must leave it first.
    AlreadyInRoom(String),
    /// The room does not exist (anymore).
    RoomNotFound(String),
    /// The user is not a player of the room named in the event.
    NotInRoom(String),
    /// The event is not allowed while the room's race is running.
    RaceInProgress(String),
    /// The payload failed validation.
    InvalidEvent(String),
}

impl LobbyError {
    /// Conflicts are shown to the user as a message; stale references are dropped quietly.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::RoomNameTaken(_) | Self::RoomUnavailable(_) | Self::AlreadyInRoom(_)
        )
    }
}

impl fmt::Display for LobbyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoomNameTaken(_) => write!(f, "There is room with this name!"),
            Self::RoomUnavailable(room) => write!(f, "Room {room} is not available"),
            Self::AlreadyInRoom(room) => write!(f, "You are already in room {room}"),
            Self::RoomNotFound(room) => write!(f, "Room {room} not found"),
            Self::NotInRoom(room) => write!(f, "Not a player of room {room}"),
            Self::RaceInProgress(room) => write!(f, "Race in room {room} is in progress"),
            Self::InvalidEvent(msg) => write!(f, "Invalid event: {msg}"),
        }
    }
}

impl std::error::Error for LobbyError {}

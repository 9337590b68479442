//! Outbound fan-out used by the lobby.
//!
//! The lobby never talks to sockets directly. Every notification goes through one of three
//! shapes: back to the sender, to the sender's room without the sender, or to every
//! connection without the sender.

use uuid::Uuid;

use crate::protocol::ServerEvent;

/// Identifies one live connection.
pub type ConnectionId = Uuid;

/// Delivery capability handed to every lobby operation.
pub trait Gateway {
    /// Send to the connection that triggered the current event.
    fn reply(&self, sender: ConnectionId, event: &ServerEvent);

    /// Send to every connection subscribed to `room`, except `sender`.
    fn to_room_except(&self, sender: ConnectionId, room: &str, event: &ServerEvent);

    /// Send to every connection, except `sender`.
    fn to_all_except(&self, sender: ConnectionId, event: &ServerEvent);

    /// Subscribe `conn` to the channel of `room`.
    fn subscribe(&self, conn: ConnectionId, room: &str);

    /// Remove `conn` from the channel of `room`. Empty channels are dropped.
    fn unsubscribe(&self, conn: ConnectionId, room: &str);

    /// Send to every connection subscribed to `room`.
    fn to_room(&self, room: &str, event: &ServerEvent) {
        self.to_room_except(ConnectionId::nil(), room, event);
    }
}

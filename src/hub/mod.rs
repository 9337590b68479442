//! In-memory connection hub for the real-time channel.
//!
//! Tracks every live `WebSocket` connection and which room channels it is subscribed to.
//! Implements the lobby's [`Gateway`], so lobby notifications end up on the sockets.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc;

use crate::lobby::{ConnectionId, Gateway};
use crate::protocol::ServerEvent;

/// A message destined for a specific `WebSocket` client.
pub type WsTx = mpsc::UnboundedSender<String>;

/// Tracks all active connections and room channels.
#[derive(Debug, Clone, Default)]
pub struct Hub {
    /// `connection_id` → sender channel
    connections: Arc<DashMap<ConnectionId, WsTx>>,
    /// `room` → subscribed connections
    channels: Arc<DashMap<String, DashSet<ConnectionId>>>,
}

impl Hub {
    /// Create a new empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            channels: Arc::new(DashMap::new()),
        }
    }

    /// Register a client connection.
    pub fn register(&self, conn: ConnectionId, tx: WsTx) {
        self.connections.insert(conn, tx);
    }

    /// Unregister a client connection and drop it from every room channel.
    pub fn unregister(&self, conn: ConnectionId) {
        self.connections.remove(&conn);
        self.channels.retain(|_, members| {
            members.remove(&conn);
            !members.is_empty()
        });
    }

    /// Check if a specific client is connected.
    #[must_use]
    pub fn is_connected(&self, conn: ConnectionId) -> bool {
        self.connections.contains_key(&conn)
    }

    /// Number of connections subscribed to a room channel.
    #[must_use]
    pub fn subscriber_count(&self, room: &str) -> usize {
        self.channels.get(room).map_or(0, |members| members.len())
    }

    fn send(&self, conn: ConnectionId, message: &str) {
        if let Some(tx) = self.connections.get(&conn) {
            let _ = tx.send(message.to_string());
        }
    }

    fn encode(event: &ServerEvent) -> Option<String> {
        match serde_json::to_string(event) {
            Ok(message) => Some(message),
            Err(err) => {
                tracing::error!(%err, "Failed to encode server event");
                None
            }
        }
    }
}

impl Gateway for Hub {
    fn reply(&self, sender: ConnectionId, event: &ServerEvent) {
        if let Some(message) = Self::encode(event) {
            self.send(sender, &message);
        }
    }

    fn to_room_except(&self, sender: ConnectionId, room: &str, event: &ServerEvent) {
        let Some(message) = Self::encode(event) else {
            return;
        };
        if let Some(members) = self.channels.get(room) {
            for conn in members.iter() {
                if *conn != sender {
                    self.send(*conn, &message);
                }
            }
        }
    }

    fn to_all_except(&self, sender: ConnectionId, event: &ServerEvent) {
        let Some(message) = Self::encode(event) else {
            return;
        };
        for entry in self.connections.iter() {
            if *entry.key() != sender {
                let _ = entry.value().send(message.clone());
            }
        }
    }

    fn subscribe(&self, conn: ConnectionId, room: &str) {
        self.channels
            .entry(room.to_string())
            .or_default()
            .insert(conn);
    }

    fn unsubscribe(&self, conn: ConnectionId, room: &str) {
        if let Some(members) = self.channels.get(room) {
            members.remove(&conn);
            if members.is_empty() {
                drop(members);
                self.channels.remove_if(room, |_, members| members.is_empty());
            }
        }
    }
}

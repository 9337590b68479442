use crate::lobby::LobbyError;
use crate::lobby::room::Room;
use crate::protocol::RoomListing;

/// Rooms that currently exist, in creation order.
///
/// Room counts stay small, so a vector keeps listing order stable without an extra index.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: Vec<Room>,
}

impl RoomDirectory {
    /// Every room that is not hidden, as `(name, snapshot)` pairs.
    #[must_use]
    pub fn list_visible(&self) -> RoomListing {
        self.rooms
            .iter()
            .filter(|room| !room.hidden)
            .map(|room| (room.name.clone(), room.snapshot()))
            .collect()
    }

    /// Create a lobby with `creator` as its only player.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::RoomNameTaken`] if a room with that name exists.
    pub fn create(
        &mut self,
        name: &str,
        creator: &str,
        capacity: usize,
    ) -> Result<&mut Room, LobbyError> {
        if self.contains(name) {
            return Err(LobbyError::RoomNameTaken(name.to_string()));
        }
        self.rooms.push(Room::new(name, creator, capacity));
        let last = self.rooms.len() - 1;
        Ok(&mut self.rooms[last])
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Room> {
        self.rooms.iter().find(|room| room.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Room> {
        self.rooms.iter_mut().find(|room| room.name == name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn delete(&mut self, name: &str) -> Option<Room> {
        let index = self.rooms.iter().position(|room| room.name == name)?;
        Some(self.rooms.remove(index))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

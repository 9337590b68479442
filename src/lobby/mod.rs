//! Room and session state behind the real-time channel.
//!
//! [`Lobby`] owns the presence registry, the room directory and the membership index. Each
//! inbound event is applied as one step: validate against the registries, mutate a single
//! room, then emit the resulting notifications through a [`Gateway`]. Callers serialize
//! access (one `Lobby` behind one mutex), which keeps every step atomic.

mod directory;
mod error;
pub mod gateway;
mod membership;
mod presence;
pub mod room;

use std::time::Duration;

use rand::Rng;
use uuid::Uuid;

pub use directory::RoomDirectory;
pub use error::LobbyError;
pub use gateway::{ConnectionId, Gateway};
pub use membership::{MembershipIndex, Seat};
pub use presence::{PresenceRegistry, Registration};
pub use room::{Player, Room, RoomPhase};

use crate::config::GameSettings;
use crate::protocol::{ClientEvent, ServerEvent};

/// The identity a connection acts under for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub username: String,
}

impl Session {
    #[must_use]
    pub fn new(username: &str) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            username: username.to_string(),
        }
    }
}

/// A race that just started. The caller owns the server-side deadline for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceStart {
    pub room: String,
    pub race_id: Uuid,
    pub deadline: Duration,
}

#[derive(Debug)]
pub struct Lobby {
    settings: GameSettings,
    text_pool_size: usize,
    presence: PresenceRegistry,
    directory: RoomDirectory,
    membership: MembershipIndex,
}

impl Lobby {
    /// `text_pool_size` bounds the random text index announced at race start.
    #[must_use]
    pub fn new(settings: GameSettings, text_pool_size: usize) -> Self {
        Self {
            settings,
            text_pool_size: text_pool_size.max(1),
            presence: PresenceRegistry::default(),
            directory: RoomDirectory::default(),
            membership: MembershipIndex::default(),
        }
    }

    #[must_use]
    pub fn room(&self, name: &str) -> Option<&Room> {
        self.directory.get(name)
    }

    #[must_use]
    pub fn room_count(&self) -> usize {
        self.directory.len()
    }

    #[must_use]
    pub fn online_count(&self) -> usize {
        self.presence.len()
    }

    #[must_use]
    pub fn is_online(&self, username: &str) -> bool {
        self.presence.is_online(username)
    }

    #[must_use]
    pub fn room_of(&self, username: &str) -> Option<&str> {
        self.membership.room_of(username)
    }

    /// Register a new connection and send it the public room list.
    pub fn connect(&mut self, session: &Session, gw: &impl Gateway) -> Registration {
        let registration = self.presence.register(&session.username);
        if registration == Registration::Duplicate {
            tracing::warn!(username = %session.username, "Display name already online");
            gw.reply(session.connection_id, &ServerEvent::ExistingUser);
        }
        gw.reply(
            session.connection_id,
            &ServerEvent::RenderRooms(self.directory.list_visible()),
        );
        registration
    }

    /// Tear down a connection, leaving its room first if it holds a seat.
    pub fn disconnect(&mut self, session: &Session, gw: &impl Gateway) -> Option<RaceStart> {
        let mut started = None;
        if self
            .membership
            .seat_room(&session.username, session.connection_id)
            .is_some()
        {
            match self.leave_room(session, None, true, gw) {
                Ok(start) => started = start,
                Err(err) => tracing::debug!(username = %session.username, %err, "Leave on disconnect"),
            }
        }
        self.presence.unregister(&session.username);
        started
    }

    /// Apply one validated client event.
    ///
    /// # Errors
    ///
    /// Returns the [`LobbyError`] of the operation the event maps to.
    pub fn handle(
        &mut self,
        session: &Session,
        event: ClientEvent,
        gw: &impl Gateway,
    ) -> Result<Option<RaceStart>, LobbyError> {
        match event {
            ClientEvent::JoinRoom { room_name } => self.join_room(session, &room_name, gw),
            ClientEvent::CreateRoom { room_name } => {
                self.create_room(session, &room_name, gw).map(|()| None)
            }
            ClientEvent::Exit { room_name } => {
                self.leave_room(session, room_name.as_deref(), false, gw)
            }
            ClientEvent::ChangeReadiness { room_name } => {
                self.change_readiness(session, &room_name, gw)
            }
            ClientEvent::SetMeProgress { percent, room_name } => self
                .set_progress(session, &room_name, percent, gw)
                .map(|()| None),
            ClientEvent::EndTime { percent, room_name } => self
                .end_time(session, &room_name, percent, gw)
                .map(|()| None),
            ClientEvent::RestartRoom { room_name } => {
                self.restart_room(session, &room_name, gw).map(|()| None)
            }
        }
    }

    /// Create a room with the sender as its only player.
    ///
    /// # Errors
    ///
    /// [`LobbyError::AlreadyInRoom`] if the user is seated elsewhere,
    /// [`LobbyError::RoomNameTaken`] if the name exists.
    pub fn create_room(
        &mut self,
        session: &Session,
        room_name: &str,
        gw: &impl Gateway,
    ) -> Result<(), LobbyError> {
        self.ensure_unseated(&session.username)?;
        let room = self.directory.create(
            room_name,
            &session.username,
            self.settings.max_users_per_room,
        )?;
        let players = room.player_views();
        self.membership
            .record(&session.username, room_name, session.connection_id);
        gw.subscribe(session.connection_id, room_name);

        tracing::info!(room = %room_name, username = %session.username, "Room created");

        let listing = self.directory.list_visible();
        gw.reply(
            session.connection_id,
            &ServerEvent::JoinRoomDone {
                room_name: room_name.to_string(),
            },
        );
        gw.reply(session.connection_id, &ServerEvent::UpdateRoom { players });
        gw.reply(session.connection_id, &ServerEvent::RenderRooms(listing.clone()));
        gw.to_all_except(session.connection_id, &ServerEvent::RenderRooms(listing));
        Ok(())
    }

    /// Seat the sender in an existing room.
    ///
    /// # Errors
    ///
    /// [`LobbyError::AlreadyInRoom`], [`LobbyError::RoomNotFound`], or
    /// [`LobbyError::RoomUnavailable`] when the room is full or racing.
    pub fn join_room(
        &mut self,
        session: &Session,
        room_name: &str,
        gw: &impl Gateway,
    ) -> Result<Option<RaceStart>, LobbyError> {
        self.ensure_unseated(&session.username)?;
        let room = self
            .directory
            .get_mut(room_name)
            .ok_or_else(|| LobbyError::RoomNotFound(room_name.to_string()))?;
        room.add_player(&session.username)?;
        let became_hidden = room.hidden;
        let count = room.players.len();
        let players = room.player_views();

        self.membership
            .record(&session.username, room_name, session.connection_id);

        if became_hidden {
            gw.to_all_except(
                session.connection_id,
                &ServerEvent::RenderRooms(self.directory.list_visible()),
            );
        } else {
            gw.to_all_except(
                session.connection_id,
                &ServerEvent::UpdateUsersNumber {
                    room_name: room_name.to_string(),
                    count,
                },
            );
        }

        gw.subscribe(session.connection_id, room_name);
        gw.reply(
            session.connection_id,
            &ServerEvent::JoinRoomDone {
                room_name: room_name.to_string(),
            },
        );
        gw.reply(session.connection_id, &ServerEvent::UpdateRoom { players });
        gw.to_room_except(
            session.connection_id,
            room_name,
            &ServerEvent::AddToRoom {
                username: session.username.clone(),
                ready: false,
            },
        );

        tracing::debug!(room = %room_name, username = %session.username, count, "Player joined");
        Ok(self.check_readiness(session, room_name, gw))
    }

    /// Take the sender out of their room.
    ///
    /// The room comes from the membership index; a `requested` name that disagrees with it is
    /// stale. On disconnect the sender gets no reply.
    ///
    /// # Errors
    ///
    /// [`LobbyError::NotInRoom`] when the sender holds no matching seat,
    /// [`LobbyError::RoomNotFound`] when the seat points at a vanished room.
    pub fn leave_room(
        &mut self,
        session: &Session,
        requested: Option<&str>,
        disconnect: bool,
        gw: &impl Gateway,
    ) -> Result<Option<RaceStart>, LobbyError> {
        let room_name = self
            .membership
            .seat_room(&session.username, session.connection_id)
            .map(str::to_string)
            .ok_or_else(|| {
                LobbyError::NotInRoom(requested.unwrap_or_default().to_string())
            })?;
        if let Some(stale) = requested.filter(|requested| *requested != room_name) {
            return Err(LobbyError::NotInRoom(stale.to_string()));
        }

        self.membership.remove(&session.username);
        gw.unsubscribe(session.connection_id, &room_name);

        let room = self
            .directory
            .get_mut(&room_name)
            .ok_or_else(|| LobbyError::RoomNotFound(room_name.clone()))?;
        room.remove_player(&session.username);

        if room.players.is_empty() {
            self.directory.delete(&room_name);
            tracing::info!(room = %room_name, "Room deleted");

            let listing = self.directory.list_visible();
            gw.to_all_except(session.connection_id, &ServerEvent::RenderRooms(listing.clone()));
            if !disconnect {
                gw.reply(session.connection_id, &ServerEvent::RenderRooms(listing));
            }
            return Ok(None);
        }

        let visibility_changed = room.reconcile_visibility();
        let in_progress = room.in_progress;
        let count = room.players.len();
        let round_reset = room.settle_round();
        let players = room.player_views();

        if visibility_changed {
            gw.to_all_except(
                session.connection_id,
                &ServerEvent::RenderRooms(self.directory.list_visible()),
            );
        } else {
            gw.to_all_except(
                session.connection_id,
                &ServerEvent::UpdateUsersNumber {
                    room_name: room_name.clone(),
                    count,
                },
            );
        }
        gw.to_room_except(
            session.connection_id,
            &room_name,
            &ServerEvent::RemoveFromRoom {
                username: session.username.clone(),
            },
        );
        if round_reset {
            gw.to_room(&room_name, &ServerEvent::UpdateAfterRestart { players });
        }
        if !disconnect {
            gw.reply(
                session.connection_id,
                &ServerEvent::RenderRooms(self.directory.list_visible()),
            );
        }

        tracing::debug!(room = %room_name, username = %session.username, disconnect, "Player left");

        if in_progress {
            self.finish_if_complete(session, &room_name, gw);
            Ok(None)
        } else {
            Ok(self.check_readiness(session, &room_name, gw))
        }
    }

    /// Toggle the sender's readiness and start the race if everyone is ready.
    ///
    /// # Errors
    ///
    /// [`LobbyError::NotInRoom`], [`LobbyError::RoomNotFound`], or
    /// [`LobbyError::RaceInProgress`] while racing.
    pub fn change_readiness(
        &mut self,
        session: &Session,
        room_name: &str,
        gw: &impl Gateway,
    ) -> Result<Option<RaceStart>, LobbyError> {
        let room = self.seated_room_mut(session, room_name)?;
        if room.in_progress {
            return Err(LobbyError::RaceInProgress(room_name.to_string()));
        }
        let ready = room
            .toggle_ready(&session.username)
            .ok_or_else(|| LobbyError::NotInRoom(room_name.to_string()))?;

        let event = ServerEvent::ChangeReadyStatus {
            username: session.username.clone(),
            ready,
        };
        gw.to_room_except(session.connection_id, room_name, &event);
        gw.reply(session.connection_id, &event);

        Ok(self.check_readiness(session, room_name, gw))
    }

    /// Broadcast the sender's progress; 100% ranks them.
    ///
    /// # Errors
    ///
    /// [`LobbyError::NotInRoom`] or [`LobbyError::RoomNotFound`].
    pub fn set_progress(
        &mut self,
        session: &Session,
        room_name: &str,
        percent: u32,
        gw: &impl Gateway,
    ) -> Result<(), LobbyError> {
        let room = self.seated_room_mut(session, room_name)?;
        let finished = room.record_progress(&session.username, percent);

        let event = ServerEvent::SetProgress {
            username: session.username.clone(),
            progress: percent,
        };
        gw.reply(session.connection_id, &event);
        gw.to_room_except(session.connection_id, room_name, &event);

        if finished {
            tracing::debug!(room = %room_name, username = %session.username, "Player finished");
            self.finish_if_complete(session, room_name, gw);
        }
        Ok(())
    }

    /// Record that the sender's clock ran out at `percent`.
    ///
    /// # Errors
    ///
    /// [`LobbyError::NotInRoom`] or [`LobbyError::RoomNotFound`].
    pub fn end_time(
        &mut self,
        session: &Session,
        room_name: &str,
        percent: u32,
        gw: &impl Gateway,
    ) -> Result<(), LobbyError> {
        let room = self.seated_room_mut(session, room_name)?;
        if room.record_timeout(&session.username, percent) {
            self.finish_if_complete(session, room_name, gw);
        } else {
            tracing::debug!(room = %room_name, username = %session.username, "Timeout report ignored");
        }
        Ok(())
    }

    /// Move the sender back to the lobby after a race.
    ///
    /// # Errors
    ///
    /// [`LobbyError::NotInRoom`], [`LobbyError::RoomNotFound`], or
    /// [`LobbyError::RaceInProgress`] while the race is still running.
    pub fn restart_room(
        &mut self,
        session: &Session,
        room_name: &str,
        gw: &impl Gateway,
    ) -> Result<(), LobbyError> {
        let room = self.seated_room_mut(session, room_name)?;
        room.restart_player(&session.username)?;
        let visibility_changed = room.reconcile_visibility();
        let winners_cleared = room.winners.is_empty();
        room.settle_round();
        let players = room.player_views();

        if visibility_changed {
            gw.to_all_except(
                session.connection_id,
                &ServerEvent::RenderRooms(self.directory.list_visible()),
            );
        }
        if winners_cleared {
            tracing::info!(room = %room_name, "Room back in lobby");
            let event = ServerEvent::UpdateAfterRestart { players };
            gw.reply(session.connection_id, &event);
            gw.to_room_except(session.connection_id, room_name, &event);
        }
        Ok(())
    }

    /// Server-side deadline for a race. Stale deadlines change nothing.
    ///
    /// Returns `true` if the race was closed by this call.
    pub fn expire_race(&mut self, room_name: &str, race_id: Uuid, gw: &impl Gateway) -> bool {
        let Some(room) = self.directory.get_mut(room_name) else {
            return false;
        };
        if !room.expire(race_id) || !room.is_race_complete() {
            return false;
        }
        let winners = room.finish();
        tracing::info!(room = %room_name, ?winners, "Race closed by deadline");
        gw.to_room(room_name, &ServerEvent::EndGame { winners });
        true
    }

    /// Start the race when more than one player is seated and all of them are ready.
    fn check_readiness(
        &mut self,
        session: &Session,
        room_name: &str,
        gw: &impl Gateway,
    ) -> Option<RaceStart> {
        let room = self.directory.get_mut(room_name)?;
        if !room.can_start() {
            return None;
        }
        let race_id = Uuid::new_v4();
        room.start_race(race_id);

        let listing = self.directory.list_visible();
        gw.to_all_except(session.connection_id, &ServerEvent::RenderRooms(listing.clone()));
        gw.reply(session.connection_id, &ServerEvent::RenderRooms(listing));

        let text_index = rand::thread_rng().gen_range(0..self.text_pool_size);
        let start = ServerEvent::StartTimer {
            countdown_seconds: self.settings.seconds_before_start,
            race_seconds: self.settings.seconds_for_game,
            text_index,
        };
        self.announce(session, room_name, &start, gw);

        tracing::info!(room = %room_name, %race_id, text_index, "Race started");
        Some(RaceStart {
            room: room_name.to_string(),
            race_id,
            deadline: self.settings.race_deadline(),
        })
    }

    /// Broadcast the final ranking once every player finished or timed out.
    fn finish_if_complete(&mut self, session: &Session, room_name: &str, gw: &impl Gateway) {
        let Some(room) = self.directory.get_mut(room_name) else {
            return;
        };
        if !room.is_race_complete() {
            return;
        }
        let winners = room.finish();
        tracing::info!(room = %room_name, ?winners, "Race finished");
        self.announce(session, room_name, &ServerEvent::EndGame { winners }, gw);
    }

    /// Send to the whole room, through the sender's reply path when they are seated in it.
    fn announce(&self, session: &Session, room_name: &str, event: &ServerEvent, gw: &impl Gateway) {
        if self
            .membership
            .holds_seat(&session.username, session.connection_id, room_name)
        {
            gw.reply(session.connection_id, event);
        }
        gw.to_room_except(session.connection_id, room_name, event);
    }

    fn ensure_unseated(&self, username: &str) -> Result<(), LobbyError> {
        match self.membership.room_of(username) {
            Some(room) => Err(LobbyError::AlreadyInRoom(room.to_string())),
            None => Ok(()),
        }
    }

    fn seated_room_mut(
        &mut self,
        session: &Session,
        room_name: &str,
    ) -> Result<&mut Room, LobbyError> {
        if !self
            .membership
            .holds_seat(&session.username, session.connection_id, room_name)
        {
            return Err(LobbyError::NotInRoom(room_name.to_string()));
        }
        self.directory
            .get_mut(room_name)
            .ok_or_else(|| LobbyError::RoomNotFound(room_name.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::gateway::recording::{RecordingGateway, Target};
    use super::*;

    fn lobby() -> Lobby {
        Lobby::new(GameSettings::default(), 7)
    }

    fn events(gw: &RecordingGateway) -> Vec<ServerEvent> {
        gw.take().into_iter().map(|(_, event)| event).collect()
    }

    fn seated(lobby: &mut Lobby, gw: &RecordingGateway, room: &str, names: &[&str]) -> Vec<Session> {
        let sessions: Vec<Session> = names.iter().map(|name| Session::new(name)).collect();
        for (i, session) in sessions.iter().enumerate() {
            lobby.connect(session, gw);
            if i == 0 {
                assert!(lobby.create_room(session, room, gw).is_ok());
            } else {
                assert!(lobby.join_room(session, room, gw).is_ok());
            }
        }
        gw.take();
        sessions
    }

    fn ready_all(lobby: &mut Lobby, gw: &RecordingGateway, room: &str, sessions: &[Session]) -> Option<RaceStart> {
        let mut started = None;
        for session in sessions {
            started = lobby.change_readiness(session, room, gw).ok().flatten();
        }
        started
    }

    #[test]
    fn test_connect_sends_room_list_and_flags_duplicates() {
        let mut lobby = lobby();
        let gw = RecordingGateway::default();
        let first = Session::new("alice");
        assert_eq!(lobby.connect(&first, &gw), Registration::Accepted);
        assert_eq!(events(&gw), vec![ServerEvent::RenderRooms(vec![])]);

        let second = Session::new("alice");
        assert_eq!(lobby.connect(&second, &gw), Registration::Duplicate);
        assert_eq!(
            events(&gw),
            vec![ServerEvent::ExistingUser, ServerEvent::RenderRooms(vec![])]
        );
        assert!(lobby.is_online("alice"));
    }

    #[test]
    fn test_create_room_replies_and_broadcasts() {
        let mut lobby = lobby();
        let gw = RecordingGateway::default();
        let alice = Session::new("alice");
        lobby.connect(&alice, &gw);
        gw.take();

        assert!(lobby.create_room(&alice, "R1", &gw).is_ok());
        let sent = gw.take();
        assert_eq!(sent.len(), 4);
        assert_eq!(
            sent[0],
            (
                Target::Reply(alice.connection_id),
                ServerEvent::JoinRoomDone {
                    room_name: "R1".to_string()
                }
            )
        );
        assert!(matches!(sent[3], (Target::AllExcept(_), ServerEvent::RenderRooms(ref rooms)) if rooms.len() == 1));
        assert_eq!(lobby.room_of("alice"), Some("R1"));
        assert_eq!(gw.subscribers("R1"), 1);
    }

    #[test]
    fn test_create_taken_name_is_conflict() {
        let mut lobby = lobby();
        let gw = RecordingGateway::default();
        seated(&mut lobby, &gw, "R1", &["alice"]);
        let bob = Session::new("bob");
        lobby.connect(&bob, &gw);
        assert_eq!(
            lobby.create_room(&bob, "R1", &gw),
            Err(LobbyError::RoomNameTaken("R1".to_string()))
        );
        assert_eq!(lobby.room_of("bob"), None);
    }

    #[test]
    fn test_join_sends_count_update_then_room_view() {
        let mut lobby = lobby();
        let gw = RecordingGateway::default();
        seated(&mut lobby, &gw, "R1", &["alice"]);
        let bob = Session::new("bob");
        lobby.connect(&bob, &gw);
        gw.take();

        assert_eq!(lobby.join_room(&bob, "R1", &gw), Ok(None));
        let sent = events(&gw);
        assert_eq!(
            sent[0],
            ServerEvent::UpdateUsersNumber {
                room_name: "R1".to_string(),
                count: 2
            }
        );
        assert_eq!(
            sent[3],
            ServerEvent::AddToRoom {
                username: "bob".to_string(),
                ready: false
            }
        );
    }

    #[test]
    fn test_join_at_capacity_hides_room_and_blocks_more() {
        let mut lobby = lobby();
        let gw = RecordingGateway::default();
        seated(&mut lobby, &gw, "R1", &["a", "b", "c"]);
        let d = Session::new("d");
        lobby.connect(&d, &gw);
        gw.take();

        assert!(lobby.join_room(&d, "R1", &gw).is_ok());
        let sent = events(&gw);
        assert_eq!(sent[0], ServerEvent::RenderRooms(vec![]));
        assert!(lobby.room("R1").is_some_and(|room| room.hidden));

        let e = Session::new("e");
        lobby.connect(&e, &gw);
        assert_eq!(
            lobby.join_room(&e, "R1", &gw),
            Err(LobbyError::RoomUnavailable("R1".to_string()))
        );
        assert!(lobby.room("R1").is_some_and(|room| room.players.len() == 4));
    }

    #[test]
    fn test_join_missing_room_is_not_found() {
        let mut lobby = lobby();
        let gw = RecordingGateway::default();
        let bob = Session::new("bob");
        lobby.connect(&bob, &gw);
        gw.take();
        assert_eq!(
            lobby.join_room(&bob, "nowhere", &gw),
            Err(LobbyError::RoomNotFound("nowhere".to_string()))
        );
        assert!(gw.take().is_empty());
    }

    #[test]
    fn test_create_while_seated_is_rejected() {
        let mut lobby = lobby();
        let gw = RecordingGateway::default();
        let sessions = seated(&mut lobby, &gw, "R1", &["alice"]);
        assert_eq!(
            lobby.create_room(&sessions[0], "R2", &gw),
            Err(LobbyError::AlreadyInRoom("R1".to_string()))
        );
        assert!(lobby.room("R2").is_none());
        assert_eq!(lobby.room_of("alice"), Some("R1"));
        assert!(gw.take().is_empty());
    }

    #[test]
    fn test_join_while_seated_is_rejected() {
        let mut lobby = lobby();
        let gw = RecordingGateway::default();
        let sessions = seated(&mut lobby, &gw, "R1", &["alice"]);
        seated(&mut lobby, &gw, "R2", &["bob"]);
        assert_eq!(
            lobby.join_room(&sessions[0], "R2", &gw),
            Err(LobbyError::AlreadyInRoom("R1".to_string()))
        );
    }

    #[test]
    fn test_last_leave_deletes_room() {
        let mut lobby = lobby();
        let gw = RecordingGateway::default();
        let sessions = seated(&mut lobby, &gw, "R1", &["alice"]);
        assert_eq!(lobby.leave_room(&sessions[0], Some("R1"), false, &gw), Ok(None));
        assert!(lobby.room("R1").is_none());
        assert_eq!(lobby.room_of("alice"), None);
        assert_eq!(gw.subscribers("R1"), 0);
        assert_eq!(
            gw.take(),
            vec![
                (
                    Target::AllExcept(sessions[0].connection_id),
                    ServerEvent::RenderRooms(vec![])
                ),
                (
                    Target::Reply(sessions[0].connection_id),
                    ServerEvent::RenderRooms(vec![])
                ),
            ]
        );
    }

    #[test]
    fn test_leave_with_stale_room_name_is_noop() {
        let mut lobby = lobby();
        let gw = RecordingGateway::default();
        let sessions = seated(&mut lobby, &gw, "R1", &["alice", "bob"]);
        assert_eq!(
            lobby.leave_room(&sessions[0], Some("R9"), false, &gw),
            Err(LobbyError::NotInRoom("R9".to_string()))
        );
        assert_eq!(lobby.room_of("alice"), Some("R1"));
    }

    #[test]
    fn test_leave_can_start_race_for_the_rest() {
        let mut lobby = lobby();
        let gw = RecordingGateway::default();
        let sessions = seated(&mut lobby, &gw, "R1", &["a", "b", "c"]);
        lobby.change_readiness(&sessions[0], "R1", &gw).ok();
        lobby.change_readiness(&sessions[1], "R1", &gw).ok();
        gw.take();

        let started = lobby.leave_room(&sessions[2], None, false, &gw).ok().flatten();
        assert!(started.is_some_and(|start| start.room == "R1"));
        let room = lobby.room("R1");
        assert!(room.is_some_and(|room| room.in_progress && room.hidden));

        // The leaver is no longer seated, so the start only goes to the room.
        let starts: Vec<Target> = gw
            .take()
            .into_iter()
            .filter(|(_, event)| matches!(event, ServerEvent::StartTimer { .. }))
            .map(|(target, _)| target)
            .collect();
        assert_eq!(
            starts,
            vec![Target::RoomExcept(sessions[2].connection_id, "R1".to_string())]
        );
    }

    #[test]
    fn test_readiness_starts_race_only_when_all_ready() {
        let mut lobby = lobby();
        let gw = RecordingGateway::default();
        let solo = seated(&mut lobby, &gw, "solo", &["alone"]);
        assert_eq!(lobby.change_readiness(&solo[0], "solo", &gw), Ok(None));

        let sessions = seated(&mut lobby, &gw, "R1", &["a", "b"]);
        assert_eq!(lobby.change_readiness(&sessions[0], "R1", &gw), Ok(None));
        let started = lobby.change_readiness(&sessions[1], "R1", &gw).ok().flatten();
        let Some(start) = started else {
            panic!("two ready players should start the race");
        };
        assert_eq!(start.room, "R1");
        assert_eq!(start.deadline, GameSettings::default().race_deadline());

        let timer = events(&gw).into_iter().find_map(|event| match event {
            ServerEvent::StartTimer {
                countdown_seconds,
                race_seconds,
                text_index,
            } => Some((countdown_seconds, race_seconds, text_index)),
            _ => None,
        });
        assert!(timer.is_some_and(|(countdown, race, index)| countdown == 10 && race == 60 && index < 7));
    }

    #[test]
    fn test_readiness_locked_during_race() {
        let mut lobby = lobby();
        let gw = RecordingGateway::default();
        let sessions = seated(&mut lobby, &gw, "R1", &["a", "b"]);
        ready_all(&mut lobby, &gw, "R1", &sessions);
        assert_eq!(
            lobby.change_readiness(&sessions[0], "R1", &gw),
            Err(LobbyError::RaceInProgress("R1".to_string()))
        );
    }

    #[test]
    fn test_repeated_finish_reports_rank_once() {
        let mut lobby = lobby();
        let gw = RecordingGateway::default();
        let sessions = seated(&mut lobby, &gw, "R1", &["a", "b"]);
        ready_all(&mut lobby, &gw, "R1", &sessions);
        gw.take();

        assert!(lobby.set_progress(&sessions[0], "R1", 100, &gw).is_ok());
        assert!(lobby.set_progress(&sessions[0], "R1", 100, &gw).is_ok());
        assert!(lobby.room("R1").is_some_and(|room| room.winners == vec!["a".to_string()]));
        assert!(!events(&gw).iter().any(|e| matches!(e, ServerEvent::EndGame { .. })));
    }

    #[test]
    fn test_timeouts_close_race_with_tie_break() {
        let mut lobby = lobby();
        let gw = RecordingGateway::default();
        let sessions = seated(&mut lobby, &gw, "R1", &["p1", "p2", "p3"]);
        ready_all(&mut lobby, &gw, "R1", &sessions);
        gw.take();

        lobby.end_time(&sessions[0], "R1", 60, &gw).ok();
        lobby.end_time(&sessions[1], "R1", 80, &gw).ok();
        lobby.end_time(&sessions[2], "R1", 80, &gw).ok();

        let ranking = ServerEvent::EndGame {
            winners: vec!["p2".to_string(), "p3".to_string(), "p1".to_string()],
        };
        assert_eq!(
            gw.take(),
            vec![
                (Target::Reply(sessions[2].connection_id), ranking.clone()),
                (
                    Target::RoomExcept(sessions[2].connection_id, "R1".to_string()),
                    ranking
                ),
            ]
        );
    }

    #[test]
    fn test_expire_race_closes_and_ignores_stale_ids() {
        let mut lobby = lobby();
        let gw = RecordingGateway::default();
        let sessions = seated(&mut lobby, &gw, "R1", &["a", "b"]);
        let start = ready_all(&mut lobby, &gw, "R1", &sessions);
        let race_id = start.map_or_else(Uuid::nil, |s| s.race_id);
        lobby.set_progress(&sessions[1], "R1", 40, &gw).ok();
        gw.take();

        assert!(!lobby.expire_race("R1", Uuid::new_v4(), &gw));
        assert!(!lobby.expire_race("nowhere", race_id, &gw));
        assert!(lobby.expire_race("R1", race_id, &gw));
        assert_eq!(
            events(&gw),
            vec![ServerEvent::EndGame {
                winners: vec!["b".to_string(), "a".to_string()]
            }]
        );
        assert!(!lobby.expire_race("R1", race_id, &gw));
    }

    #[test]
    fn test_leaving_mid_race_lets_others_finish() {
        let mut lobby = lobby();
        let gw = RecordingGateway::default();
        let sessions = seated(&mut lobby, &gw, "R1", &["a", "b", "c"]);
        ready_all(&mut lobby, &gw, "R1", &sessions);
        lobby.set_progress(&sessions[0], "R1", 100, &gw).ok();
        lobby.set_progress(&sessions[1], "R1", 100, &gw).ok();
        gw.take();

        lobby.disconnect(&sessions[2], &gw);
        let ended = events(&gw).into_iter().find_map(|event| match event {
            ServerEvent::EndGame { winners } => Some(winners),
            _ => None,
        });
        assert_eq!(ended, Some(vec!["a".to_string(), "b".to_string()]));
        assert!(lobby.room("R1").is_some_and(|room| room.hidden));
    }

    #[test]
    fn test_duplicate_connection_cannot_touch_original_seat() {
        let mut lobby = lobby();
        let gw = RecordingGateway::default();
        let sessions = seated(&mut lobby, &gw, "R1", &["alice", "bob"]);
        let impostor = Session::new("alice");
        lobby.connect(&impostor, &gw);

        assert_eq!(
            lobby.change_readiness(&impostor, "R1", &gw),
            Err(LobbyError::NotInRoom("R1".to_string()))
        );
        lobby.disconnect(&impostor, &gw);
        assert_eq!(lobby.room_of("alice"), Some("R1"));
        assert!(lobby.is_online("alice"));
        assert!(lobby.room("R1").is_some_and(|room| room.contains(&sessions[0].username)));
    }

    #[test]
    fn test_restart_broadcasts_when_ranking_is_cleared() {
        let mut lobby = lobby();
        let gw = RecordingGateway::default();
        let sessions = seated(&mut lobby, &gw, "R1", &["a", "b"]);
        ready_all(&mut lobby, &gw, "R1", &sessions);
        lobby.set_progress(&sessions[0], "R1", 100, &gw).ok();
        assert_eq!(
            lobby.restart_room(&sessions[0], "R1", &gw),
            Err(LobbyError::RaceInProgress("R1".to_string()))
        );
        lobby.set_progress(&sessions[1], "R1", 100, &gw).ok();
        gw.take();

        assert!(lobby.restart_room(&sessions[0], "R1", &gw).is_ok());
        let first = events(&gw);
        assert_eq!(first.len(), 1);
        assert!(matches!(first[0], ServerEvent::RenderRooms(ref rooms) if rooms.len() == 1));

        assert!(lobby.restart_room(&sessions[1], "R1", &gw).is_ok());
        let players = vec![
            crate::protocol::PlayerView {
                name: "a".to_string(),
                is_ready: false,
            },
            crate::protocol::PlayerView {
                name: "b".to_string(),
                is_ready: false,
            },
        ];
        assert_eq!(
            events(&gw),
            vec![
                ServerEvent::UpdateAfterRestart {
                    players: players.clone()
                },
                ServerEvent::UpdateAfterRestart { players },
            ]
        );
        assert!(lobby.room("R1").is_some_and(|room| room.phase() == RoomPhase::Lobby));
    }

    #[test]
    fn test_end_time_before_race_is_ignored() {
        let mut lobby = lobby();
        let gw = RecordingGateway::default();
        let sessions = seated(&mut lobby, &gw, "R1", &["a", "b"]);

        assert_eq!(lobby.end_time(&sessions[0], "R1", 40, &gw), Ok(()));
        assert!(gw.take().is_empty());
        assert!(lobby.room("R1").is_some_and(|room| room.end_timers.is_empty()));

        // The early report does not count towards the race that follows.
        ready_all(&mut lobby, &gw, "R1", &sessions);
        lobby.end_time(&sessions[1], "R1", 10, &gw).ok();
        assert!(!events(&gw).iter().any(|e| matches!(e, ServerEvent::EndGame { .. })));
        assert!(lobby.room("R1").is_some_and(|room| room.in_progress && !room.finished));
    }

    #[test]
    fn test_last_ranked_player_leaving_resets_round() {
        let mut lobby = lobby();
        let gw = RecordingGateway::default();
        let sessions = seated(&mut lobby, &gw, "R1", &["a", "b", "c"]);
        ready_all(&mut lobby, &gw, "R1", &sessions);
        for session in &sessions {
            lobby.set_progress(session, "R1", 100, &gw).ok();
        }
        assert!(lobby.restart_room(&sessions[0], "R1", &gw).is_ok());
        assert!(lobby.restart_room(&sessions[1], "R1", &gw).is_ok());
        gw.take();

        assert_eq!(lobby.leave_room(&sessions[2], None, false, &gw), Ok(None));
        let reset = ServerEvent::UpdateAfterRestart {
            players: vec![
                crate::protocol::PlayerView {
                    name: "a".to_string(),
                    is_ready: false,
                },
                crate::protocol::PlayerView {
                    name: "b".to_string(),
                    is_ready: false,
                },
            ],
        };
        let sent = gw.take();
        assert!(sent.contains(&(
            Target::RoomExcept(ConnectionId::nil(), "R1".to_string()),
            reset
        )));

        let room = lobby.room("R1");
        assert!(room.is_some_and(|room| room.phase() == RoomPhase::Lobby && !room.hidden));
        assert!(room.is_some_and(|room| room.winners.is_empty() && room.race_id.is_none()));

        let started = ready_all(&mut lobby, &gw, "R1", &sessions[..2]);
        assert!(started.is_some_and(|start| start.room == "R1"));
    }

    #[test]
    fn test_second_round_ranks_only_its_own_results() {
        let mut lobby = lobby();
        let gw = RecordingGateway::default();
        let sessions = seated(&mut lobby, &gw, "R1", &["a", "b"]);

        ready_all(&mut lobby, &gw, "R1", &sessions);
        lobby.set_progress(&sessions[0], "R1", 100, &gw).ok();
        lobby.end_time(&sessions[1], "R1", 40, &gw).ok();
        for session in &sessions {
            assert!(lobby.restart_room(session, "R1", &gw).is_ok());
        }
        gw.take();

        let Some(start) = ready_all(&mut lobby, &gw, "R1", &sessions) else {
            panic!("second round should start");
        };
        let room = lobby.room("R1");
        assert!(room.is_some_and(|room| room.race_id == Some(start.race_id)));
        assert!(room.is_some_and(|room| room.winners.is_empty() && room.end_timers.is_empty()));
        assert!(room.is_some_and(|room| room.players.iter().all(|p| p.progress == 0)));

        lobby.set_progress(&sessions[1], "R1", 100, &gw).ok();
        lobby.set_progress(&sessions[0], "R1", 100, &gw).ok();
        let rankings: Vec<ServerEvent> = events(&gw)
            .into_iter()
            .filter(|event| matches!(event, ServerEvent::EndGame { .. }))
            .collect();
        let ranking = ServerEvent::EndGame {
            winners: vec!["b".to_string(), "a".to_string()],
        };
        assert_eq!(rankings, vec![ranking.clone(), ranking]);
    }
}

//! Per-room lifecycle and race progress.
//!
//! A room moves `Lobby -> LobbyFull -> Racing -> Finished -> Lobby`. Visibility is derived
//! from the other fields and reconciled after every change: a room is hidden exactly when
//! it is full or its race is running.

use uuid::Uuid;

use crate::lobby::LobbyError;
use crate::protocol::{PlayerView, RoomSnapshot};

/// A player seated in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub name: String,
    pub is_ready: bool,
    /// Last progress reported during the current race, in percent.
    pub progress: u32,
}

impl Player {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_ready: false,
            progress: 0,
        }
    }
}

/// Where a room is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    /// Accepting players.
    Lobby,
    /// At capacity, waiting for readiness.
    LobbyFull,
    Racing,
    /// Ranking is final; waiting for players to restart.
    Finished,
}

#[derive(Debug, Clone)]
pub struct Room {
    pub name: String,
    pub capacity: usize,
    pub hidden: bool,
    pub in_progress: bool,
    /// Ranking was broadcast for the current round.
    pub finished: bool,
    /// Join order.
    pub players: Vec<Player>,
    /// Finishing order, first finisher first.
    pub winners: Vec<String>,
    /// `(username, progress)` of players whose clock ran out, in arrival order.
    pub end_timers: Vec<(String, u32)>,
    /// Identifies the running race so stale deadlines can be told apart.
    pub race_id: Option<Uuid>,
}

impl Room {
    /// A fresh lobby with `creator` as its only, not-ready player.
    #[must_use]
    pub fn new(name: &str, creator: &str, capacity: usize) -> Self {
        let mut room = Self {
            name: name.to_string(),
            capacity,
            hidden: false,
            in_progress: false,
            finished: false,
            players: vec![Player::new(creator)],
            winners: Vec::new(),
            end_timers: Vec::new(),
            race_id: None,
        };
        room.reconcile_visibility();
        room
    }

    #[must_use]
    pub fn phase(&self) -> RoomPhase {
        if self.finished {
            RoomPhase::Finished
        } else if self.in_progress {
            RoomPhase::Racing
        } else if self.is_full() {
            RoomPhase::LobbyFull
        } else {
            RoomPhase::Lobby
        }
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.players.len() >= self.capacity
    }

    #[must_use]
    pub fn contains(&self, username: &str) -> bool {
        self.players.iter().any(|p| p.name == username)
    }

    fn player_mut(&mut self, username: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.name == username)
    }

    fn has_won(&self, username: &str) -> bool {
        self.winners.iter().any(|w| w == username)
    }

    fn has_timed_out(&self, username: &str) -> bool {
        self.end_timers.iter().any(|(name, _)| name == username)
    }

    /// Set `hidden` from capacity and race state. Returns `true` if it changed.
    pub fn reconcile_visibility(&mut self) -> bool {
        let hidden = self.is_full() || self.in_progress;
        let changed = hidden != self.hidden;
        self.hidden = hidden;
        changed
    }

    /// Seat a new, not-ready player.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::RoomUnavailable`] if the room is hidden (full or racing).
    pub fn add_player(&mut self, username: &str) -> Result<(), LobbyError> {
        if self.hidden || self.is_full() || self.in_progress {
            return Err(LobbyError::RoomUnavailable(self.name.clone()));
        }
        self.players.push(Player::new(username));
        self.reconcile_visibility();
        Ok(())
    }

    /// Drop a player together with any ranking or timeout entry they left behind.
    pub fn remove_player(&mut self, username: &str) -> bool {
        let before = self.players.len();
        self.players.retain(|p| p.name != username);
        self.winners.retain(|w| w != username);
        self.end_timers.retain(|(name, _)| name != username);
        self.players.len() != before
    }

    /// Flip readiness. Returns the new value, or `None` if the user is not seated here.
    pub fn toggle_ready(&mut self, username: &str) -> Option<bool> {
        let player = self.player_mut(username)?;
        player.is_ready = !player.is_ready;
        Some(player.is_ready)
    }

    /// More than one player, all ready, and no round pending.
    #[must_use]
    pub fn can_start(&self) -> bool {
        !self.in_progress
            && !self.finished
            && self.players.len() > 1
            && self.players.iter().all(|p| p.is_ready)
    }

    /// Enter the racing state under `race_id`.
    pub fn start_race(&mut self, race_id: Uuid) {
        self.in_progress = true;
        self.finished = false;
        self.race_id = Some(race_id);
        self.winners.clear();
        self.end_timers.clear();
        for player in &mut self.players {
            player.progress = 0;
        }
        self.reconcile_visibility();
    }

    const fn is_racing(&self) -> bool {
        self.in_progress && !self.finished
    }

    /// Store a progress report. Reaching 100% ranks the player, once.
    ///
    /// Returns `true` if the player was newly appended to `winners`.
    pub fn record_progress(&mut self, username: &str, percent: u32) -> bool {
        if !self.is_racing() {
            return false;
        }
        let Some(player) = self.player_mut(username) else {
            return false;
        };
        player.progress = percent;
        if percent < 100 || self.has_won(username) || self.has_timed_out(username) {
            return false;
        }
        self.winners.push(username.to_string());
        true
    }

    /// Store a timeout report from a player who has not finished.
    ///
    /// Returns `true` if the report was accepted.
    pub fn record_timeout(&mut self, username: &str, percent: u32) -> bool {
        if !self.is_racing()
            || !self.contains(username)
            || self.has_won(username)
            || self.has_timed_out(username)
        {
            return false;
        }
        self.end_timers.push((username.to_string(), percent));
        true
    }

    /// Every player has either finished or timed out.
    #[must_use]
    pub fn is_race_complete(&self) -> bool {
        self.is_racing()
            && !self.players.is_empty()
            && self.players.len() == self.winners.len() + self.end_timers.len()
    }

    /// Close the round and return the final ranking.
    ///
    /// Timed-out players are appended after the finishers, higher progress first. Equal
    /// progress keeps arrival order.
    pub fn finish(&mut self) -> Vec<String> {
        let mut timed_out = self.end_timers.clone();
        timed_out.sort_by(|a, b| b.1.cmp(&a.1));
        for (name, _) in timed_out {
            if !self.has_won(&name) {
                self.winners.push(name);
            }
        }
        self.finished = true;
        self.winners.clone()
    }

    /// Server deadline for `race_id`: everyone still unaccounted for times out at their last
    /// reported progress.
    ///
    /// Returns `false` when the deadline is stale and nothing changed.
    pub fn expire(&mut self, race_id: Uuid) -> bool {
        if self.race_id != Some(race_id) || !self.is_racing() {
            return false;
        }
        let pending: Vec<(String, u32)> = self
            .players
            .iter()
            .filter(|p| !self.has_won(&p.name) && !self.has_timed_out(&p.name))
            .map(|p| (p.name.clone(), p.progress))
            .collect();
        self.end_timers.extend(pending);
        true
    }

    /// Put a player back into the lobby after a race.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::RaceInProgress`] while the race is still running, or
    /// [`LobbyError::NotInRoom`] if the user is not seated here.
    pub fn restart_player(&mut self, username: &str) -> Result<(), LobbyError> {
        if self.is_racing() {
            return Err(LobbyError::RaceInProgress(self.name.clone()));
        }
        let player = self
            .player_mut(username)
            .ok_or_else(|| LobbyError::NotInRoom(username.to_string()))?;
        player.is_ready = false;
        player.progress = 0;
        self.winners.retain(|w| w != username);
        self.in_progress = false;
        Ok(())
    }

    /// Once nobody is left on the ranking of a closed race, forget the round.
    ///
    /// Returns `true` if the round was reset by this call.
    pub fn settle_round(&mut self) -> bool {
        if self.in_progress || !self.finished || !self.winners.is_empty() {
            return false;
        }
        self.finished = false;
        self.end_timers.clear();
        self.race_id = None;
        true
    }

    #[must_use]
    pub fn player_views(&self) -> Vec<PlayerView> {
        self.players
            .iter()
            .map(|p| PlayerView {
                name: p.name.clone(),
                is_ready: p.is_ready,
            })
            .collect()
    }

    #[must_use]
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            hidden: self.hidden,
            in_progress: self.in_progress,
            players: self.player_views(),
        }
    }
}

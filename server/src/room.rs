//! Per-match session bookkeeping and fan-out access.
//!
//! Rooms hold only weak references to matches (the broadcast sender of
//! the match's broadcaster); the authoritative match object stays with
//! the match manager.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::warn;

use crate::frame::RoomEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    Player,
    Spectator,
}

struct RoomEntry {
    tx: broadcast::Sender<RoomEvent>,
    players: u64,
    spectators: u64,
}

#[derive(Default)]
pub struct RoomManager {
    rooms: Mutex<HashMap<String, RoomEntry>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the match manager when a match launches.
    pub fn register(&self, match_id: &str, tx: broadcast::Sender<RoomEvent>) {
        let mut rooms = self.rooms.lock().expect("room registry");
        rooms.insert(
            match_id.to_owned(),
            RoomEntry {
                tx,
                players: 0,
                spectators: 0,
            },
        );
    }

    /// Called by the match manager when a match unloads.
    pub fn unregister(&self, match_id: &str) {
        let mut rooms = self.rooms.lock().expect("room registry");
        rooms.remove(match_id);
    }

    /// Attach a session: returns the event stream of the room.
    pub fn join(
        &self,
        match_id: &str,
        role: SessionRole,
    ) -> Option<broadcast::Receiver<RoomEvent>> {
        let mut rooms = self.rooms.lock().expect("room registry");
        let entry = rooms.get_mut(match_id)?;
        match role {
            SessionRole::Player => entry.players += 1,
            SessionRole::Spectator => entry.spectators += 1,
        }
        Some(entry.tx.subscribe())
    }

    pub fn leave(&self, match_id: &str, role: SessionRole) {
        let mut rooms = self.rooms.lock().expect("room registry");
        if let Some(entry) = rooms.get_mut(match_id) {
            match role {
                SessionRole::Player => entry.players = entry.players.saturating_sub(1),
                SessionRole::Spectator => entry.spectators = entry.spectators.saturating_sub(1),
            }
        }
    }

    /// `(players, spectators)` attached to a room.
    pub fn count(&self, match_id: &str) -> (u64, u64) {
        let rooms = self.rooms.lock().expect("room registry");
        rooms
            .get(match_id)
            .map(|e| (e.players, e.spectators))
            .unwrap_or((0, 0))
    }

    /// Out-of-band fan-out, bypassing the match event bus.  Used for
    /// frames that do not touch match state.
    pub fn broadcast(&self, match_id: &str, mut event: RoomEvent, exclude_session: Option<u64>) {
        event.except = exclude_session;
        let rooms = self.rooms.lock().expect("room registry");
        if let Some(entry) = rooms.get(match_id) {
            if entry.tx.send(event).is_err() {
                warn!("Broadcast to empty room {match_id}");
            }
        }
    }
}

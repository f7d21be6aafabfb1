//! Shared read-model of one live match.
//!
//! The event loop owns the authoritative state and writes the view
//! after every transition; sessions and HTTP reads only ever look here.
//! Reads never touch the transcript.

use std::sync::{Arc, RwLock};

use serde_json::Value;

use dork_api::engine::GameModule;
use dork_api::types::Outcome;
use dork_core::frame::GameStatePayload;
use dork_core::types::{current_timestamp, Match};

use crate::orchestrator::MatchOrchestrator;

#[derive(Debug, Clone)]
pub struct MatchView {
    pub record: Match,
    pub state: Value,
    pub current_player: Option<String>,
    pub terminal: bool,
    pub outcome: Option<Outcome>,
    pub sequence: u64,
    pub root_hash: String,
    pub last_activity: u64,
}

pub type SharedMatchView = Arc<RwLock<MatchView>>;

impl MatchView {
    pub fn from_orchestrator(record: Match, orchestrator: &MatchOrchestrator) -> Self {
        Self {
            record,
            state: orchestrator.state().clone(),
            current_player: orchestrator.current_player(),
            terminal: orchestrator.is_terminal(),
            outcome: orchestrator.outcome().cloned(),
            sequence: orchestrator.sequence(),
            root_hash: orchestrator.root_hash().to_owned(),
            last_activity: current_timestamp(),
        }
    }

    /// Refresh the play-state fields from the orchestrator.
    pub fn sync_play_state(&mut self, orchestrator: &MatchOrchestrator) {
        self.state = orchestrator.state().clone();
        self.current_player = orchestrator.current_player();
        self.terminal = orchestrator.is_terminal();
        self.outcome = orchestrator.outcome().cloned();
        self.sequence = orchestrator.sequence();
        self.root_hash = orchestrator.root_hash().to_owned();
        self.last_activity = current_timestamp();
    }

    /// The full-resync payload for one viewer.
    pub fn game_state_payload(&self, module: &dyn GameModule, viewer: &str) -> GameStatePayload {
        GameStatePayload {
            observation: module.observation(&self.state, viewer),
            status: self.record.status.to_string(),
            current_player: self.current_player.clone(),
            players: self.record.players.clone(),
            stake: self.record.stake.clone(),
            your_turn: self.current_player.as_deref() == Some(viewer),
        }
    }
}

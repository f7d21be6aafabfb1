//! Persistence seam.
//!
//! The production deployment backs this with Postgres; the bundled
//! implementation lives in `dork-local-db`.  Archived matches replay
//! through the game module from the recorded seed and moves.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::transcript::TranscriptEntry;
use crate::types::{ChatMessage, Match};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRow {
    pub addr: String,
    pub rating: i32,
    pub games_played: u32,
    pub games_won: u32,
    pub games_drawn: u32,
    /// Accumulated winnings in wei as decimal text.
    pub earnings: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub addr: String,
    pub rating: i32,
    pub games_played: u32,
    pub games_won: u32,
    pub games_drawn: u32,
    pub earnings: String,
}

/// Everything the recorder needs to settle stats for one completed
/// match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResultUpdate {
    pub match_id: String,
    pub game_id: String,
    pub players: Vec<String>,
    pub winner: Option<String>,
    pub draw: bool,
    pub stake: String,
}

#[async_trait]
pub trait StorageT: Send + Sync {
    /// Insert or update the match row.
    async fn save_match(&self, m: &Match) -> Result<()>;

    async fn get_match(&self, id: &str) -> Result<Option<Match>>;

    async fn list_archive(
        &self,
        game_id: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Match>>;

    /// One row per transcript entry.
    async fn save_move(&self, match_id: &str, entry: &TranscriptEntry) -> Result<()>;

    async fn load_moves(&self, match_id: &str) -> Result<Vec<TranscriptEntry>>;

    async fn save_chat(&self, message: &ChatMessage) -> Result<()>;

    async fn load_chat(&self, match_id: &str, limit: u32) -> Result<Vec<ChatMessage>>;

    /// Create the player rows when absent.
    async fn ensure_players(&self, addrs: &[String]) -> Result<()>;

    async fn get_player(&self, addr: &str) -> Result<Option<PlayerRow>>;

    /// Apply ratings, win/draw counters and earnings for a completed
    /// match, both overall and per game.
    async fn record_result(&self, update: &MatchResultUpdate) -> Result<()>;

    /// Paginated rankings; `game_id = None` is the overall board.
    async fn leaderboard(
        &self,
        game_id: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<LeaderboardEntry>>;
}

use std::collections::BTreeMap;

use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

/// Queue ticket time-to-live; refreshed on every matchmaking poll.
pub const TICKET_TTL_MS: u64 = 30_000;
/// Pending-match notification time-to-live.
pub const PENDING_MATCH_TTL_MS: u64 = 2 * 60 * 1000;
/// Single-use WS token time-to-live.
pub const WS_TOKEN_TTL_MS: u64 = 5 * 60 * 1000;
/// Active-match index entry time-to-live.
pub const ACTIVE_INDEX_TTL_MS: u64 = 60 * 60 * 1000;
/// Maximum chat message length.
pub const CHAT_MAX_LEN: usize = 500;

pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Waiting,
    Active,
    Completed,
    Settled,
    Disputed,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Waiting => "WAITING",
            MatchStatus::Active => "ACTIVE",
            MatchStatus::Completed => "COMPLETED",
            MatchStatus::Settled => "SETTLED",
            MatchStatus::Disputed => "DISPUTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "WAITING" => Some(MatchStatus::Waiting),
            "ACTIVE" => Some(MatchStatus::Active),
            "COMPLETED" => Some(MatchStatus::Completed),
            "SETTLED" => Some(MatchStatus::Settled),
            "DISPUTED" => Some(MatchStatus::Disputed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self >= MatchStatus::Completed
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authoritative record of one match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: String,
    pub game_id: String,
    /// Ordered roster; seat order is fixed at creation.
    pub players: Vec<String>,
    pub status: MatchStatus,
    /// Per-player stake in wei as decimal text; "0" means unstaked.
    pub stake: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settle_tx: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_code: Option<String>,
    #[serde(default)]
    pub deposit_confirmed: BTreeMap<String, bool>,
    /// RNG seed recorded for replay.
    pub seed: String,
    pub created_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
}

impl Match {
    pub fn is_staked(&self) -> bool {
        self.stake != "0"
    }

    pub fn opponent_of(&self, player: &str) -> Option<&str> {
        if self.players.len() != 2 {
            return None;
        }
        match self.players.iter().position(|p| p == player)? {
            0 => Some(self.players[1].as_str()),
            _ => Some(self.players[0].as_str()),
        }
    }

    pub fn has_player(&self, player: &str) -> bool {
        self.players.iter().any(|p| p == player)
    }

    pub fn all_deposits_confirmed(&self) -> bool {
        self.players
            .iter()
            .all(|p| self.deposit_confirmed.get(p).copied().unwrap_or(false))
    }
}

/// Opaque matchmaking handle.  Transient, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueTicket {
    pub id: String,
    pub player: String,
    pub game_id: String,
    pub stake: String,
    pub expires_at: u64,
}

impl QueueTicket {
    pub fn new(player: &str, game_id: &str, stake: &str, now: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            player: player.to_owned(),
            game_id: game_id.to_owned(),
            stake: stake.to_owned(),
            expires_at: now + TICKET_TTL_MS,
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now
    }
}

/// Points the second player of a fresh pairing at the match the other
/// player's poll created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingMatch {
    pub player: String,
    pub game_id: String,
    pub stake: String,
    pub match_id: String,
    pub opponent: String,
    pub ws_token: String,
    pub expires_at: u64,
}

/// Single-use token authorizing one transport upgrade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WsToken {
    pub token: String,
    pub match_id: String,
    pub player: String,
    pub expires_at: u64,
}

impl WsToken {
    pub fn new(match_id: &str, player: &str, now: u64) -> Self {
        Self {
            token: random_string(48),
            match_id: match_id.to_owned(),
            player: player.to_owned(),
            expires_at: now + WS_TOKEN_TTL_MS,
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now
    }
}

/// `playerId -> live match` pointer used for reconnection discovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveMatchEntry {
    pub match_id: String,
    pub game_id: String,
    pub stake: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub match_id: String,
    pub player: String,
    pub message: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub game_id: String,
    pub stake: String,
    pub depth: u64,
}

pub fn new_match_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 8 chars of `[A-Za-z0-9]`, ~47.6 bits of entropy.
pub fn new_invite_code() -> String {
    random_string(8)
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ordering_and_terminal() {
        assert!(MatchStatus::Waiting < MatchStatus::Active);
        assert!(MatchStatus::Active < MatchStatus::Completed);
        assert!(!MatchStatus::Active.is_terminal());
        assert!(MatchStatus::Completed.is_terminal());
        assert!(MatchStatus::Settled.is_terminal());
        assert!(MatchStatus::Disputed.is_terminal());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            MatchStatus::Waiting,
            MatchStatus::Active,
            MatchStatus::Completed,
            MatchStatus::Settled,
            MatchStatus::Disputed,
        ] {
            assert_eq!(MatchStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MatchStatus::parse("???"), None);
    }

    #[test]
    fn test_ticket_expiry() {
        let ticket = QueueTicket::new("0xaa", "tictactoe", "0", 1000);
        assert!(!ticket.is_expired(1000));
        assert!(ticket.is_expired(1000 + TICKET_TTL_MS));
    }

    #[test]
    fn test_opponent_of() {
        let m = Match {
            id: "m".into(),
            game_id: "g".into(),
            players: vec!["0xaa".into(), "0xbb".into()],
            status: MatchStatus::Active,
            stake: "0".into(),
            winner: None,
            reason: None,
            root_hash: None,
            settle_tx: None,
            invite_code: None,
            deposit_confirmed: Default::default(),
            seed: "s".into(),
            created_at: 0,
            completed_at: None,
        };
        assert_eq!(m.opponent_of("0xaa"), Some("0xbb"));
        assert_eq!(m.opponent_of("0xbb"), Some("0xaa"));
        assert_eq!(m.opponent_of("0xcc"), None);
    }

    #[test]
    fn test_invite_code_shape() {
        let code = new_invite_code();
        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}

//! The session wire protocol.
//!
//! Every frame, inbound or outbound, is one JSON object
//! `{type, matchId, payload, sequence, prevHash, timestamp}`.  On
//! outbound frames `sequence` is the transcript sequence the event
//! relates to (0 for non-move events) and `prevHash` the current
//! transcript root.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use dork_api::types::Outcome;

use crate::types::current_timestamp;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameType {
    Hello,
    ActionCommit,
    ActionReveal,
    StepResult,
    GameState,
    GameOver,
    SpectateJoin,
    SpectateState,
    Chat,
    ChatHistory,
    SyncRequest,
    SyncResponse,
    DepositRequired,
    DepositsConfirmed,
    Forfeit,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    #[serde(rename = "type")]
    pub frame_type: FrameType,
    pub match_id: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub sequence: u64,
    #[serde(default)]
    pub prev_hash: String,
    #[serde(default)]
    pub timestamp: u64,
}

impl Frame {
    pub fn new(frame_type: FrameType, match_id: &str, payload: Value) -> Self {
        Self {
            frame_type,
            match_id: match_id.to_owned(),
            payload,
            sequence: 0,
            prev_hash: String::new(),
            timestamp: current_timestamp(),
        }
    }

    pub fn with_transcript(mut self, sequence: u64, prev_hash: &str) -> Self {
        self.sequence = sequence;
        self.prev_hash = prev_hash.to_owned();
        self
    }
}

/// HELLO carries either a single-use token (first attach) or a signed
/// reattach proof.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HelloPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionPayload {
    pub action: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    #[serde(default)]
    pub player: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequestPayload {
    #[serde(default)]
    pub client_is_my_turn: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponsePayload {
    pub your_turn: bool,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_player: Option<String>,
    pub sequence: u64,
    /// True when the client's view diverged and a GAME_STATE follows.
    pub divergent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameStatePayload {
    pub observation: Value,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_player: Option<String>,
    pub players: Vec<String>,
    pub stake: String,
    pub your_turn: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepResultPayload {
    pub player: String,
    pub action: Value,
    pub observation: Value,
    pub terminal: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_player: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameOverPayload {
    pub outcome: Outcome,
    pub root_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequiredPayload {
    pub escrow_address: String,
    pub stake_wei: String,
    pub match_id_bytes32: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DepositsConfirmedPayload {
    pub player: String,
    pub all_confirmed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl ErrorPayload {
    pub fn from_error(e: &crate::error::Error) -> Self {
        Self {
            code: e.code().to_owned(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_type_tags_are_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&FrameType::ActionCommit).unwrap(),
            "\"ACTION_COMMIT\""
        );
        assert_eq!(
            serde_json::to_string(&FrameType::DepositsConfirmed).unwrap(),
            "\"DEPOSITS_CONFIRMED\""
        );
        let parsed: FrameType = serde_json::from_str("\"SYNC_REQUEST\"").unwrap();
        assert_eq!(parsed, FrameType::SyncRequest);
    }

    #[test]
    fn test_frame_wire_shape() {
        let frame = Frame::new(FrameType::Chat, "m1", json!({"message": "gg"}))
            .with_transcript(4, "0xroot");
        let wire: Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(wire["type"], "CHAT");
        assert_eq!(wire["matchId"], "m1");
        assert_eq!(wire["sequence"], 4);
        assert_eq!(wire["prevHash"], "0xroot");
        assert!(wire["timestamp"].as_u64().is_some());
    }

    #[test]
    fn test_hello_payload_variants() {
        let first: HelloPayload =
            serde_json::from_value(json!({"token": "t", "playerId": "0xaa"})).unwrap();
        assert_eq!(first.token.as_deref(), Some("t"));
        assert!(first.signature.is_none());

        let reattach: HelloPayload = serde_json::from_value(
            json!({"playerId": "0xaa", "signature": "0xsig", "timestamp": 12}),
        )
        .unwrap();
        assert_eq!(reattach.timestamp, Some(12));
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A set of arguments for game state initialization.  The settings map
/// is free-form and interpreted by the module itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    pub game_id: String,
    pub version: String,
    #[serde(default)]
    pub settings: BTreeMap<String, Value>,
}

impl GameConfig {
    pub fn new(game_id: impl Into<String>) -> Self {
        Self {
            game_id: game_id.into(),
            version: "1".into(),
            settings: BTreeMap::new(),
        }
    }
}

/// Per-move timeout policy declared by a module.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MoveTimeout {
    /// Use the server-wide default.
    #[default]
    ServerDefault,
    /// No per-move timeout for this game.
    Disabled,
    /// Override in milliseconds.
    Millis(u64),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameMetadata {
    pub game_id: String,
    pub display_name: String,
    pub description: String,
    pub min_players: u8,
    pub max_players: u8,
    #[serde(default)]
    pub move_timeout: MoveTimeout,
    /// Client-side rendering hints.  Never consulted by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<Value>,
}

/// Terminal result of a game as reported by its module.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    pub draw: bool,
    #[serde(default)]
    pub scores: BTreeMap<String, i64>,
    pub reason: String,
}

impl Outcome {
    pub fn win(winner: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            winner: Some(winner.into()),
            draw: false,
            scores: BTreeMap::new(),
            reason: reason.into(),
        }
    }

    pub fn draw(reason: impl Into<String>) -> Self {
        Self {
            winner: None,
            draw: true,
            scores: BTreeMap::new(),
            reason: reason.into(),
        }
    }
}

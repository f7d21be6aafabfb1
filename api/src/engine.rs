use serde_json::Value;

use crate::{
    error::HandleResult,
    random::GameRng,
    types::{GameConfig, GameMetadata, Outcome},
};

/// The rule engine of one game.  Implementations must be pure and
/// deterministic: equal inputs always produce canonically equal outputs.
///
/// Game state, actions and observations are JSON values.  A non-terminal
/// state of a game with a player to move carries a top-level
/// `"currentPlayer"` string field; the orchestrator reads it for turn
/// ownership (see [`current_player`]).
pub trait GameModule: Send + Sync {
    fn metadata(&self) -> GameMetadata;

    /// Build the initial state.  The `seed` string is recorded with the
    /// match, so replays reproduce the same bytes.
    fn init(&self, config: &GameConfig, players: &[String], seed: &str) -> HandleResult<Value>;

    /// True iff `action` is playable by `player` right now.  Must not
    /// error on malformed input.
    fn validate_action(&self, state: &Value, player: &str, action: &Value) -> bool;

    /// Apply a validated action and return the next state without
    /// mutating the input.  May fail only when its own preconditions
    /// (validated up-stack) are violated.
    fn apply_action(
        &self,
        state: &Value,
        player: &str,
        action: &Value,
        rng: &mut GameRng,
    ) -> HandleResult<Value>;

    fn is_terminal(&self, state: &Value) -> bool;

    /// The terminal result.  Only meaningful when [`Self::is_terminal`]
    /// holds.
    fn outcome(&self, state: &Value) -> Outcome;

    /// The view of `state` for `player`: public fields plus any fields
    /// private to that player.  The reserved player id
    /// [`SPECTATOR`] yields the public view.
    fn observation(&self, state: &Value, player: &str) -> Value;

    /// Finite set of playable actions; empty when `player` is not to
    /// move.
    fn legal_actions(&self, state: &Value, player: &str) -> Vec<Value>;
}

/// Pseudo player id used to request the public observation.
pub const SPECTATOR: &str = "spectator";

/// Read the turn owner out of a state, if the game declares one.
pub fn current_player(state: &Value) -> Option<&str> {
    state.get("currentPlayer")?.as_str()
}

//! Tic-tac-toe, the reference module of the server test suites.
//! Fully public information, no randomness.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use dork_api::prelude::*;

pub const GAME_ID: &str = "tictactoe";

const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct State {
    board: Vec<Option<String>>,
    current_player: String,
    marks: BTreeMap<String, String>,
    players: Vec<String>,
    move_count: u32,
}

impl State {
    fn parse(value: &Value) -> HandleResult<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| HandleError::MalformedState(e.to_string()))
    }

    fn winning_mark(&self) -> Option<&str> {
        for line in LINES.iter() {
            if let Some(mark) = self.board[line[0]].as_deref() {
                if self.board[line[1]].as_deref() == Some(mark)
                    && self.board[line[2]].as_deref() == Some(mark)
                {
                    return Some(mark);
                }
            }
        }
        None
    }

    fn is_full(&self) -> bool {
        self.board.iter().all(|c| c.is_some())
    }

    fn player_of_mark(&self, mark: &str) -> Option<String> {
        self.marks
            .iter()
            .find(|(_, m)| m.as_str() == mark)
            .map(|(p, _)| p.clone())
    }
}

fn parse_cell(action: &Value) -> Option<usize> {
    let cell = action.get("cell")?.as_u64()?;
    (cell < 9).then_some(cell as usize)
}

#[derive(Default)]
pub struct TicTacToe;

impl GameModule for TicTacToe {
    fn metadata(&self) -> GameMetadata {
        GameMetadata {
            game_id: GAME_ID.into(),
            display_name: "Tic-Tac-Toe".into(),
            description: "Three in a row wins".into(),
            min_players: 2,
            max_players: 2,
            move_timeout: MoveTimeout::ServerDefault,
            ui: None,
        }
    }

    fn init(&self, _config: &GameConfig, players: &[String], _seed: &str) -> HandleResult<Value> {
        if players.len() != 2 {
            return Err(if players.len() < 2 {
                HandleError::NoEnoughPlayers
            } else {
                HandleError::TooManyPlayers
            });
        }
        let state = State {
            board: vec![None; 9],
            current_player: players[0].clone(),
            marks: BTreeMap::from([
                (players[0].clone(), "x".to_owned()),
                (players[1].clone(), "o".to_owned()),
            ]),
            players: players.to_vec(),
            move_count: 0,
        };
        serde_json::to_value(&state).map_err(Into::into)
    }

    fn validate_action(&self, state: &Value, player: &str, action: &Value) -> bool {
        let Ok(state) = State::parse(state) else {
            return false;
        };
        if state.winning_mark().is_some() || state.is_full() {
            return false;
        }
        if state.current_player != player {
            return false;
        }
        match parse_cell(action) {
            Some(cell) => state.board[cell].is_none(),
            None => false,
        }
    }

    fn apply_action(
        &self,
        state: &Value,
        player: &str,
        action: &Value,
        _rng: &mut GameRng,
    ) -> HandleResult<Value> {
        let mut state = State::parse(state)?;
        let cell = parse_cell(action).ok_or(HandleError::Custom("bad cell".into()))?;
        let mark = state
            .marks
            .get(player)
            .cloned()
            .ok_or_else(|| HandleError::InvalidPlayer(player.to_owned()))?;
        if state.board[cell].is_some() {
            return Err(HandleError::Custom("cell occupied".into()));
        }
        state.board[cell] = Some(mark);
        state.move_count += 1;
        state.current_player = state
            .players
            .iter()
            .find(|p| p.as_str() != player)
            .cloned()
            .unwrap_or_else(|| player.to_owned());
        serde_json::to_value(&state).map_err(Into::into)
    }

    fn is_terminal(&self, state: &Value) -> bool {
        match State::parse(state) {
            Ok(state) => state.winning_mark().is_some() || state.is_full(),
            Err(_) => false,
        }
    }

    fn outcome(&self, state: &Value) -> Outcome {
        let Ok(state) = State::parse(state) else {
            return Outcome::draw("malformed_state");
        };
        match state.winning_mark().and_then(|m| state.player_of_mark(m)) {
            Some(winner) => {
                let mut outcome = Outcome::win(winner.clone(), "three_in_a_row");
                for p in &state.players {
                    outcome
                        .scores
                        .insert(p.clone(), if *p == winner { 1 } else { 0 });
                }
                outcome
            }
            None => Outcome::draw("board_full"),
        }
    }

    fn observation(&self, state: &Value, _player: &str) -> Value {
        // Perfect information; everyone sees the full state.
        state.clone()
    }

    fn legal_actions(&self, state: &Value, player: &str) -> Vec<Value> {
        let Ok(state) = State::parse(state) else {
            return vec![];
        };
        if state.current_player != player
            || state.winning_mark().is_some()
            || state.is_full()
        {
            return vec![];
        }
        state
            .board
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_none())
            .map(|(i, _)| json!({"cell": i}))
            .collect()
    }
}

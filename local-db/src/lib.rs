//! Sqlite-backed [`StorageT`] implementation.
//!
//! Five tables: players, player_game_stats, matches, match_moves and
//! chat_messages.  The production deployment swaps this for Postgres
//! behind the same trait.

use std::sync::Arc;

use alloy_primitives::U256;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::Mutex;

use dork_core::elo;
use dork_core::error::{Error, Result};
use dork_core::storage::{LeaderboardEntry, MatchResultUpdate, PlayerRow, StorageT};
use dork_core::transcript::TranscriptEntry;
use dork_core::types::{ChatMessage, Match, MatchStatus};

pub struct LocalDbStorage {
    conn: Arc<Mutex<Connection>>,
}

fn db_err(e: rusqlite::Error) -> Error {
    Error::StorageError(e.to_string())
}

fn json_err(e: serde_json::Error) -> Error {
    Error::StorageError(e.to_string())
}

fn init_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS players (
           addr TEXT PRIMARY KEY,
           rating INTEGER NOT NULL DEFAULT 1200,
           games_played INTEGER NOT NULL DEFAULT 0,
           games_won INTEGER NOT NULL DEFAULT 0,
           games_drawn INTEGER NOT NULL DEFAULT 0,
           earnings TEXT NOT NULL DEFAULT '0'
         );
         CREATE TABLE IF NOT EXISTS player_game_stats (
           addr TEXT NOT NULL,
           game_id TEXT NOT NULL,
           rating INTEGER NOT NULL DEFAULT 1200,
           games_played INTEGER NOT NULL DEFAULT 0,
           games_won INTEGER NOT NULL DEFAULT 0,
           games_drawn INTEGER NOT NULL DEFAULT 0,
           earnings TEXT NOT NULL DEFAULT '0',
           PRIMARY KEY (addr, game_id)
         );
         CREATE TABLE IF NOT EXISTS matches (
           id TEXT PRIMARY KEY,
           game_id TEXT NOT NULL,
           players TEXT NOT NULL,
           status TEXT NOT NULL,
           stake TEXT NOT NULL,
           winner TEXT,
           reason TEXT,
           root_hash TEXT,
           settle_tx TEXT,
           invite_code TEXT,
           seed TEXT NOT NULL,
           created_at INTEGER NOT NULL,
           completed_at INTEGER
         );
         CREATE INDEX IF NOT EXISTS idx_matches_game_created
           ON matches (game_id, created_at DESC);
         CREATE TABLE IF NOT EXISTS match_moves (
           match_id TEXT NOT NULL,
           sequence INTEGER NOT NULL,
           player TEXT NOT NULL,
           action TEXT NOT NULL,
           state_hash TEXT NOT NULL,
           prev_hash TEXT NOT NULL,
           timestamp INTEGER NOT NULL,
           PRIMARY KEY (match_id, sequence)
         );
         CREATE TABLE IF NOT EXISTS chat_messages (
           id INTEGER PRIMARY KEY AUTOINCREMENT,
           match_id TEXT NOT NULL,
           player TEXT NOT NULL,
           message TEXT NOT NULL,
           timestamp INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_chat_match ON chat_messages (match_id, id);",
    )
    .map_err(db_err)
}

impl LocalDbStorage {
    pub fn try_new(db_file_path: &str) -> Result<Self> {
        let conn = Connection::open(db_file_path).map_err(db_err)?;
        init_tables(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn try_new_mem() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        init_tables(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn match_from_row(row: &Row<'_>) -> rusqlite::Result<(Match, String)> {
    let players_json: String = row.get(2)?;
    let status_text: String = row.get(3)?;
    let m = Match {
        id: row.get(0)?,
        game_id: row.get(1)?,
        players: Vec::new(),
        status: MatchStatus::parse(&status_text).unwrap_or(MatchStatus::Completed),
        stake: row.get(4)?,
        winner: row.get(5)?,
        reason: row.get(6)?,
        root_hash: row.get(7)?,
        settle_tx: row.get(8)?,
        invite_code: row.get(9)?,
        deposit_confirmed: Default::default(),
        seed: row.get(10)?,
        created_at: row.get(11)?,
        completed_at: row.get(12)?,
    };
    Ok((m, players_json))
}

fn finish_match(pair: (Match, String)) -> Result<Match> {
    let (mut m, players_json) = pair;
    m.players = serde_json::from_str(&players_json).map_err(json_err)?;
    Ok(m)
}

const MATCH_COLUMNS: &str = "id, game_id, players, status, stake, winner, reason, root_hash, \
                             settle_tx, invite_code, seed, created_at, completed_at";

fn add_decimal(a: &str, b: &str) -> String {
    let a = U256::from_str_radix(a, 10).unwrap_or(U256::ZERO);
    let b = U256::from_str_radix(b, 10).unwrap_or(U256::ZERO);
    (a + b).to_string()
}

struct StatDelta<'a> {
    addr: &'a str,
    won: bool,
    drawn: bool,
    rating: i32,
    earned: &'a str,
}

fn apply_overall(conn: &Connection, d: &StatDelta<'_>) -> Result<()> {
    let (earnings,): (String,) = conn
        .query_row(
            "SELECT earnings FROM players WHERE addr = ?1",
            params![d.addr],
            |row| Ok((row.get(0)?,)),
        )
        .map_err(db_err)?;
    conn.execute(
        "UPDATE players SET rating = ?2, games_played = games_played + 1,
           games_won = games_won + ?3, games_drawn = games_drawn + ?4, earnings = ?5
         WHERE addr = ?1",
        params![
            d.addr,
            d.rating,
            d.won as i32,
            d.drawn as i32,
            add_decimal(&earnings, d.earned)
        ],
    )
    .map_err(db_err)?;
    Ok(())
}

fn apply_per_game(conn: &Connection, game_id: &str, d: &StatDelta<'_>) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO player_game_stats (addr, game_id) VALUES (?1, ?2)",
        params![d.addr, game_id],
    )
    .map_err(db_err)?;
    let (earnings,): (String,) = conn
        .query_row(
            "SELECT earnings FROM player_game_stats WHERE addr = ?1 AND game_id = ?2",
            params![d.addr, game_id],
            |row| Ok((row.get(0)?,)),
        )
        .map_err(db_err)?;
    conn.execute(
        "UPDATE player_game_stats SET rating = ?3, games_played = games_played + 1,
           games_won = games_won + ?4, games_drawn = games_drawn + ?5, earnings = ?6
         WHERE addr = ?1 AND game_id = ?2",
        params![
            d.addr,
            game_id,
            d.rating,
            d.won as i32,
            d.drawn as i32,
            add_decimal(&earnings, d.earned)
        ],
    )
    .map_err(db_err)?;
    Ok(())
}

fn per_game_rating(conn: &Connection, addr: &str, game_id: &str) -> Result<i32> {
    let rating = conn
        .query_row(
            "SELECT rating FROM player_game_stats WHERE addr = ?1 AND game_id = ?2",
            params![addr, game_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)?;
    Ok(rating.unwrap_or(elo::DEFAULT_RATING))
}

#[async_trait]
impl StorageT for LocalDbStorage {
    async fn save_match(&self, m: &Match) -> Result<()> {
        let conn = self.conn.lock().await;
        let players = serde_json::to_string(&m.players).map_err(json_err)?;
        conn.execute(
            "INSERT INTO matches (id, game_id, players, status, stake, winner, reason,
                                  root_hash, settle_tx, invite_code, seed, created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id) DO UPDATE SET
               players = ?3, status = ?4, winner = ?6, reason = ?7, root_hash = ?8,
               settle_tx = ?9, invite_code = ?10, completed_at = ?13",
            params![
                m.id,
                m.game_id,
                players,
                m.status.as_str(),
                m.stake,
                m.winner,
                m.reason,
                m.root_hash,
                m.settle_tx,
                m.invite_code,
                m.seed,
                m.created_at,
                m.completed_at,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_match(&self, id: &str) -> Result<Option<Match>> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                &format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = ?1"),
                params![id],
                match_from_row,
            )
            .optional()
            .map_err(db_err)?;
        row.map(finish_match).transpose()
    }

    async fn list_archive(
        &self,
        game_id: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Match>> {
        let conn = self.conn.lock().await;
        let terminal = "('COMPLETED','SETTLED','DISPUTED')";
        let game_id_owned: &str = game_id.unwrap_or_default();
        let (sql, filter): (String, Vec<&dyn rusqlite::ToSql>) = match game_id {
            Some(_) => (
                format!(
                    "SELECT {MATCH_COLUMNS} FROM matches
                     WHERE game_id = ?1 AND status IN {terminal}
                     ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
                ),
                vec![&game_id_owned as &dyn rusqlite::ToSql, &limit, &offset],
            ),
            None => (
                format!(
                    "SELECT {MATCH_COLUMNS} FROM matches WHERE status IN {terminal}
                     ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
                ),
                vec![&limit as &dyn rusqlite::ToSql, &offset],
            ),
        };
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(&filter[..], match_from_row)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        rows.into_iter().map(finish_match).collect()
    }

    async fn save_move(&self, match_id: &str, entry: &TranscriptEntry) -> Result<()> {
        let conn = self.conn.lock().await;
        let action = serde_json::to_string(&entry.action).map_err(json_err)?;
        conn.execute(
            "INSERT OR REPLACE INTO match_moves
               (match_id, sequence, player, action, state_hash, prev_hash, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                match_id,
                entry.sequence,
                entry.player,
                action,
                entry.state_hash,
                entry.prev_hash,
                entry.timestamp,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn load_moves(&self, match_id: &str) -> Result<Vec<TranscriptEntry>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT sequence, player, action, state_hash, prev_hash, timestamp
                 FROM match_moves WHERE match_id = ?1 ORDER BY sequence",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![match_id], |row| {
                let action_json: String = row.get(2)?;
                Ok((
                    TranscriptEntry {
                        sequence: row.get(0)?,
                        player: row.get(1)?,
                        action: serde_json::Value::Null,
                        state_hash: row.get(3)?,
                        prev_hash: row.get(4)?,
                        timestamp: row.get(5)?,
                    },
                    action_json,
                ))
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        rows.into_iter()
            .map(|(mut entry, action_json)| {
                entry.action = serde_json::from_str(&action_json).map_err(json_err)?;
                Ok(entry)
            })
            .collect()
    }

    async fn save_chat(&self, message: &ChatMessage) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO chat_messages (match_id, player, message, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                message.match_id,
                message.player,
                message.message,
                message.timestamp
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn load_chat(&self, match_id: &str, limit: u32) -> Result<Vec<ChatMessage>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT match_id, player, message, timestamp FROM chat_messages
                 WHERE match_id = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(db_err)?;
        let mut rows = stmt
            .query_map(params![match_id, limit], |row| {
                Ok(ChatMessage {
                    match_id: row.get(0)?,
                    player: row.get(1)?,
                    message: row.get(2)?,
                    timestamp: row.get(3)?,
                })
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        rows.reverse();
        Ok(rows)
    }

    async fn ensure_players(&self, addrs: &[String]) -> Result<()> {
        let conn = self.conn.lock().await;
        for addr in addrs {
            conn.execute(
                "INSERT OR IGNORE INTO players (addr) VALUES (?1)",
                params![addr],
            )
            .map_err(db_err)?;
        }
        Ok(())
    }

    async fn get_player(&self, addr: &str) -> Result<Option<PlayerRow>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT addr, rating, games_played, games_won, games_drawn, earnings
             FROM players WHERE addr = ?1",
            params![addr],
            |row| {
                Ok(PlayerRow {
                    addr: row.get(0)?,
                    rating: row.get(1)?,
                    games_played: row.get(2)?,
                    games_won: row.get(3)?,
                    games_drawn: row.get(4)?,
                    earnings: row.get(5)?,
                })
            },
        )
        .optional()
        .map_err(db_err)
    }

    async fn record_result(&self, update: &MatchResultUpdate) -> Result<()> {
        let conn = self.conn.lock().await;
        for addr in &update.players {
            conn.execute(
                "INSERT OR IGNORE INTO players (addr) VALUES (?1)",
                params![addr],
            )
            .map_err(db_err)?;
        }

        // Elo applies to the 2-player case only; other arities keep
        // counters but fixed ratings.
        if update.players.len() == 2 {
            let a = &update.players[0];
            let b = &update.players[1];
            let score_a = if update.draw {
                0.5
            } else if update.winner.as_deref() == Some(a.as_str()) {
                1.0
            } else {
                0.0
            };

            let overall_a: i32 = conn
                .query_row("SELECT rating FROM players WHERE addr = ?1", params![a], |r| r.get(0))
                .map_err(db_err)?;
            let overall_b: i32 = conn
                .query_row("SELECT rating FROM players WHERE addr = ?1", params![b], |r| r.get(0))
                .map_err(db_err)?;
            let overall = elo::calculate(overall_a, overall_b, score_a);

            let game_a = per_game_rating(&conn, a, &update.game_id)?;
            let game_b = per_game_rating(&conn, b, &update.game_id)?;
            let per_game = elo::calculate(game_a, game_b, score_a);

            let winnings = if update.draw { "0" } else { update.stake.as_str() };
            let (earn_a, earn_b) = if update.winner.as_deref() == Some(a.as_str()) {
                (winnings, "0")
            } else if update.winner.as_deref() == Some(b.as_str()) {
                ("0", winnings)
            } else {
                ("0", "0")
            };

            let delta_a = StatDelta {
                addr: a,
                won: update.winner.as_deref() == Some(a.as_str()),
                drawn: update.draw,
                rating: overall.new_a,
                earned: earn_a,
            };
            let delta_b = StatDelta {
                addr: b,
                won: update.winner.as_deref() == Some(b.as_str()),
                drawn: update.draw,
                rating: overall.new_b,
                earned: earn_b,
            };
            apply_overall(&conn, &delta_a)?;
            apply_overall(&conn, &delta_b)?;
            apply_per_game(
                &conn,
                &update.game_id,
                &StatDelta {
                    rating: per_game.new_a,
                    ..delta_a
                },
            )?;
            apply_per_game(
                &conn,
                &update.game_id,
                &StatDelta {
                    rating: per_game.new_b,
                    ..delta_b
                },
            )?;
        } else {
            for addr in &update.players {
                let rating: i32 = conn
                    .query_row("SELECT rating FROM players WHERE addr = ?1", params![addr], |r| {
                        r.get(0)
                    })
                    .map_err(db_err)?;
                let delta = StatDelta {
                    addr,
                    won: update.winner.as_deref() == Some(addr.as_str()),
                    drawn: update.draw,
                    rating,
                    earned: "0",
                };
                apply_overall(&conn, &delta)?;
                let game_rating = per_game_rating(&conn, addr, &update.game_id)?;
                apply_per_game(
                    &conn,
                    &update.game_id,
                    &StatDelta {
                        rating: game_rating,
                        ..delta
                    },
                )?;
            }
        }
        Ok(())
    }

    async fn leaderboard(
        &self,
        game_id: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<LeaderboardEntry>> {
        let conn = self.conn.lock().await;
        let map_row = |row: &Row<'_>| -> rusqlite::Result<LeaderboardEntry> {
            Ok(LeaderboardEntry {
                addr: row.get(0)?,
                rating: row.get(1)?,
                games_played: row.get(2)?,
                games_won: row.get(3)?,
                games_drawn: row.get(4)?,
                earnings: row.get(5)?,
            })
        };
        let rows = match game_id {
            Some(game_id) => {
                let mut stmt = conn
                    .prepare(
                        "SELECT addr, rating, games_played, games_won, games_drawn, earnings
                         FROM player_game_stats WHERE game_id = ?1
                         ORDER BY rating DESC, games_won DESC LIMIT ?2 OFFSET ?3",
                    )
                    .map_err(db_err)?;
                let result = stmt
                    .query_map(params![game_id, limit, offset], map_row)
                    .map_err(db_err)?
                    .collect::<rusqlite::Result<Vec<_>>>();
                result
            }
            None => {
                let mut stmt = conn
                    .prepare(
                        "SELECT addr, rating, games_played, games_won, games_drawn, earnings
                         FROM players ORDER BY rating DESC, games_won DESC LIMIT ?1 OFFSET ?2",
                    )
                    .map_err(db_err)?;
                let result = stmt
                    .query_map(params![limit, offset], map_row)
                    .map_err(db_err)?
                    .collect::<rusqlite::Result<Vec<_>>>();
                result
            }
        }
        .map_err(db_err)?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dork_core::types::current_timestamp;
    use serde_json::json;

    fn sample_match(id: &str, status: MatchStatus) -> Match {
        Match {
            id: id.into(),
            game_id: "tictactoe".into(),
            players: vec!["0xaa".into(), "0xbb".into()],
            status,
            stake: "0".into(),
            winner: None,
            reason: None,
            root_hash: None,
            settle_tx: None,
            invite_code: None,
            deposit_confirmed: Default::default(),
            seed: "seed".into(),
            created_at: current_timestamp(),
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn test_match_round_trip() {
        let storage = LocalDbStorage::try_new_mem().unwrap();
        let mut m = sample_match("m1", MatchStatus::Active);
        storage.save_match(&m).await.unwrap();

        m.status = MatchStatus::Completed;
        m.winner = Some("0xaa".into());
        m.reason = Some("three_in_a_row".into());
        m.root_hash = Some("0xroot".into());
        m.completed_at = Some(current_timestamp());
        storage.save_match(&m).await.unwrap();

        let loaded = storage.get_match("m1").await.unwrap().unwrap();
        assert_eq!(loaded, m);
        assert_eq!(storage.get_match("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_archive_filters_terminal() {
        let storage = LocalDbStorage::try_new_mem().unwrap();
        storage
            .save_match(&sample_match("live", MatchStatus::Active))
            .await
            .unwrap();
        storage
            .save_match(&sample_match("done", MatchStatus::Completed))
            .await
            .unwrap();

        let archived = storage.list_archive(None, 10, 0).await.unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].id, "done");

        let by_game = storage.list_archive(Some("chess"), 10, 0).await.unwrap();
        assert!(by_game.is_empty());
    }

    #[tokio::test]
    async fn test_moves_round_trip() {
        let storage = LocalDbStorage::try_new_mem().unwrap();
        let entry = TranscriptEntry {
            sequence: 0,
            player: "0xaa".into(),
            action: json!({"cell": 4}),
            state_hash: "0xs".into(),
            prev_hash: "0xp".into(),
            timestamp: 7,
        };
        storage.save_move("m1", &entry).await.unwrap();
        let moves = storage.load_moves("m1").await.unwrap();
        assert_eq!(moves, vec![entry]);
    }

    #[tokio::test]
    async fn test_chat_order_and_limit() {
        let storage = LocalDbStorage::try_new_mem().unwrap();
        for i in 0..5u64 {
            storage
                .save_chat(&ChatMessage {
                    match_id: "m1".into(),
                    player: "0xaa".into(),
                    message: format!("msg {i}"),
                    timestamp: i,
                })
                .await
                .unwrap();
        }
        let chat = storage.load_chat("m1", 3).await.unwrap();
        assert_eq!(chat.len(), 3);
        assert_eq!(chat[0].message, "msg 2");
        assert_eq!(chat[2].message, "msg 4");
    }

    #[tokio::test]
    async fn test_record_result_updates_ratings_and_earnings() {
        let storage = LocalDbStorage::try_new_mem().unwrap();
        storage
            .record_result(&MatchResultUpdate {
                match_id: "m1".into(),
                game_id: "tictactoe".into(),
                players: vec!["0xaa".into(), "0xbb".into()],
                winner: Some("0xaa".into()),
                draw: false,
                stake: "1000".into(),
            })
            .await
            .unwrap();

        let winner = storage.get_player("0xaa").await.unwrap().unwrap();
        let loser = storage.get_player("0xbb").await.unwrap().unwrap();
        assert_eq!(winner.rating, 1216);
        assert_eq!(loser.rating, 1184);
        assert_eq!(winner.games_played, 1);
        assert_eq!(winner.games_won, 1);
        assert_eq!(loser.games_won, 0);
        assert_eq!(winner.earnings, "1000");
        assert_eq!(loser.earnings, "0");

        let board = storage.leaderboard(None, 10, 0).await.unwrap();
        assert_eq!(board[0].addr, "0xaa");
        let per_game = storage.leaderboard(Some("tictactoe"), 10, 0).await.unwrap();
        assert_eq!(per_game.len(), 2);
        assert_eq!(per_game[0].rating, 1216);
    }
}

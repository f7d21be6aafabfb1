//! Redis-backed coordination store.
//!
//! Tickets live in one hash per `(gameId, stake)` queue key; hash
//! fields cannot expire individually, so expiry stamps travel inside
//! the ticket payload and scans filter on them.  Single-use records
//! (invites, WS tokens, pending-match notices) are consumed with
//! `GETDEL` so concurrent readers cannot both observe them.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use tracing::warn;

use dork_core::coordination::CoordStoreT;
use dork_core::error::{Error, Result};
use dork_core::types::{
    current_timestamp, ActiveMatchEntry, PendingMatch, QueueSnapshot, QueueTicket, WsToken,
    ACTIVE_INDEX_TTL_MS, PENDING_MATCH_TTL_MS, TICKET_TTL_MS, WS_TOKEN_TTL_MS,
};

use crate::keys;

pub struct RedisCoordStore {
    manager: ConnectionManager,
}

impl RedisCoordStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(store_err)?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(store_err)?;
        Ok(Self { manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

fn store_err(e: redis::RedisError) -> Error {
    Error::CoordStoreError(e.to_string())
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::CoordStoreError(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(value: Option<String>) -> Option<T> {
    let raw = value?;
    match serde_json::from_str(&raw) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!("Discarding undecodable coordination record: {e}");
            None
        }
    }
}

#[async_trait]
impl CoordStoreT for RedisCoordStore {
    async fn put_ticket(&self, ticket: &QueueTicket) -> Result<()> {
        let key = keys::queue(&ticket.game_id, &ticket.stake);
        let mut conn = self.conn();
        let payload = encode(ticket)?;

        // Replace any prior ticket of this player and drop its reverse
        // index entry.
        let old: Option<String> = conn
            .hget(&key, &ticket.player)
            .await
            .map_err(store_err)?;
        if let Some(old) = decode::<QueueTicket>(old) {
            let _: () = conn.del(keys::ticket_ref(&old.id)).await.map_err(store_err)?;
        }

        let _: () = conn
            .hset(&key, &ticket.player, payload)
            .await
            .map_err(store_err)?;
        let _: () = conn
            .pexpire(&key, (TICKET_TTL_MS * 2) as i64)
            .await
            .map_err(store_err)?;
        let _: () = conn
            .set_ex(
                keys::ticket_ref(&ticket.id),
                format!("{key}\n{}", ticket.player),
                TICKET_TTL_MS / 1000,
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn get_tickets(&self, game_id: &str, stake: &str) -> Result<Vec<QueueTicket>> {
        let key = keys::queue(game_id, stake);
        let mut conn = self.conn();
        let raw: std::collections::HashMap<String, String> =
            conn.hgetall(&key).await.map_err(store_err)?;
        Ok(raw
            .into_values()
            .filter_map(|v| decode(Some(v)))
            .collect())
    }

    async fn remove_ticket(&self, game_id: &str, stake: &str, player: &str) -> Result<bool> {
        let key = keys::queue(game_id, stake);
        let mut conn = self.conn();
        let old: Option<String> = conn.hget(&key, player).await.map_err(store_err)?;
        if let Some(ticket) = decode::<QueueTicket>(old) {
            let _: () = conn
                .del(keys::ticket_ref(&ticket.id))
                .await
                .map_err(store_err)?;
        }
        let removed: u64 = conn.hdel(&key, player).await.map_err(store_err)?;
        Ok(removed > 0)
    }

    async fn remove_ticket_by_id(&self, ticket_id: &str) -> Result<bool> {
        let mut conn = self.conn();
        let reference: Option<String> = conn
            .get_del(keys::ticket_ref(ticket_id))
            .await
            .map_err(store_err)?;
        let Some(reference) = reference else {
            return Ok(false);
        };
        let Some((key, player)) = reference.split_once('\n') else {
            return Ok(false);
        };
        let removed: u64 = conn.hdel(key, player).await.map_err(store_err)?;
        Ok(removed > 0)
    }

    async fn queue_snapshot(&self) -> Result<Vec<QueueSnapshot>> {
        let now = current_timestamp();
        let mut conn = self.conn();
        let mut cursor: u64 = 0;
        let mut out = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg("queue:*")
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(store_err)?;
            for key in batch {
                let Some((game_id, stake)) = keys::parse_queue(&key) else {
                    continue;
                };
                let raw: std::collections::HashMap<String, String> =
                    conn.hgetall(&key).await.map_err(store_err)?;
                let depth = raw
                    .into_values()
                    .filter_map(|v| decode::<QueueTicket>(Some(v)))
                    .filter(|t| !t.is_expired(now))
                    .count() as u64;
                if depth > 0 {
                    out.push(QueueSnapshot {
                        game_id,
                        stake,
                        depth,
                    });
                }
            }
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        out.sort_by(|a, b| (&a.game_id, &a.stake).cmp(&(&b.game_id, &b.stake)));
        Ok(out)
    }

    async fn put_pending_match(&self, notice: &PendingMatch) -> Result<()> {
        let key = keys::pending_match(&notice.player, &notice.game_id, &notice.stake);
        let mut conn = self.conn();
        let _: () = conn
            .pset_ex(key, encode(notice)?, PENDING_MATCH_TTL_MS)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn take_pending_match(
        &self,
        player: &str,
        game_id: &str,
        stake: &str,
    ) -> Result<Option<PendingMatch>> {
        let key = keys::pending_match(player, game_id, stake);
        let mut conn = self.conn();
        let raw: Option<String> = conn.get_del(key).await.map_err(store_err)?;
        Ok(decode(raw))
    }

    async fn put_invite(&self, code: &str, match_id: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn
            .pset_ex(keys::invite(code), match_id, PENDING_MATCH_TTL_MS)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn take_invite(&self, code: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        let raw: Option<String> = conn
            .get_del(keys::invite(code))
            .await
            .map_err(store_err)?;
        Ok(raw)
    }

    async fn put_ws_token(&self, token: &WsToken) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn
            .pset_ex(keys::ws_token(&token.token), encode(token)?, WS_TOKEN_TTL_MS)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn take_ws_token(&self, token: &str) -> Result<Option<WsToken>> {
        let mut conn = self.conn();
        let raw: Option<String> = conn
            .get_del(keys::ws_token(token))
            .await
            .map_err(store_err)?;
        Ok(decode(raw))
    }

    async fn set_active_match(&self, player: &str, entry: &ActiveMatchEntry) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn
            .pset_ex(
                keys::active_match(player),
                encode(entry)?,
                ACTIVE_INDEX_TTL_MS,
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn get_active_match(&self, player: &str) -> Result<Option<ActiveMatchEntry>> {
        let mut conn = self.conn();
        let raw: Option<String> = conn
            .get(keys::active_match(player))
            .await
            .map_err(store_err)?;
        Ok(decode(raw))
    }

    async fn clear_active_match(&self, player: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn
            .del(keys::active_match(player))
            .await
            .map_err(store_err)?;
        Ok(())
    }
}

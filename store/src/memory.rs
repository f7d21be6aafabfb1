//! In-memory coordination store with the same TTL semantics as the
//! Redis backend.  Used by the test suites and by local development
//! without a Redis instance.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use dork_core::coordination::CoordStoreT;
use dork_core::error::Result;
use dork_core::types::{
    current_timestamp, ActiveMatchEntry, PendingMatch, QueueSnapshot, QueueTicket, WsToken,
    ACTIVE_INDEX_TTL_MS, PENDING_MATCH_TTL_MS, WS_TOKEN_TTL_MS,
};

use crate::keys;

#[derive(Default)]
struct Inner {
    /// queue key -> player -> ticket
    queues: HashMap<String, HashMap<String, QueueTicket>>,
    /// ticket id -> (queue key, player)
    ticket_refs: HashMap<String, (String, String)>,
    /// plain keys with expiry stamps
    kv: HashMap<String, (String, u64)>,
}

impl Inner {
    fn get_kv(&mut self, key: &str, now: u64) -> Option<String> {
        let expired = match self.kv.get(key) {
            Some((_, expires_at)) => *expires_at <= now,
            None => return None,
        };
        if expired {
            self.kv.remove(key);
            return None;
        }
        self.kv.get(key).map(|(value, _)| value.clone())
    }

    fn take_kv(&mut self, key: &str, now: u64) -> Option<String> {
        let value = self.get_kv(key, now)?;
        self.kv.remove(key);
        Some(value)
    }
}

#[derive(Default)]
pub struct MemoryCoordStore {
    inner: Mutex<Inner>,
}

impl MemoryCoordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoordStoreT for MemoryCoordStore {
    async fn put_ticket(&self, ticket: &QueueTicket) -> Result<()> {
        let key = keys::queue(&ticket.game_id, &ticket.stake);
        let mut inner = self.inner.lock().await;
        let replaced = inner
            .queues
            .entry(key.clone())
            .or_default()
            .insert(ticket.player.clone(), ticket.clone());
        if let Some(old) = replaced {
            inner.ticket_refs.remove(&old.id);
        }
        inner
            .ticket_refs
            .insert(ticket.id.clone(), (key, ticket.player.clone()));
        Ok(())
    }

    async fn get_tickets(&self, game_id: &str, stake: &str) -> Result<Vec<QueueTicket>> {
        let key = keys::queue(game_id, stake);
        let inner = self.inner.lock().await;
        Ok(inner
            .queues
            .get(&key)
            .map(|q| q.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn remove_ticket(&self, game_id: &str, stake: &str, player: &str) -> Result<bool> {
        let key = keys::queue(game_id, stake);
        let mut inner = self.inner.lock().await;
        let removed = inner
            .queues
            .get_mut(&key)
            .and_then(|q| q.remove(player));
        if let Some(ticket) = removed {
            inner.ticket_refs.remove(&ticket.id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn remove_ticket_by_id(&self, ticket_id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some((key, player)) = inner.ticket_refs.remove(ticket_id) else {
            return Ok(false);
        };
        Ok(inner
            .queues
            .get_mut(&key)
            .and_then(|q| q.remove(&player))
            .is_some())
    }

    async fn queue_snapshot(&self) -> Result<Vec<QueueSnapshot>> {
        let now = current_timestamp();
        let inner = self.inner.lock().await;
        let mut out = Vec::new();
        for (key, tickets) in inner.queues.iter() {
            let Some((game_id, stake)) = keys::parse_queue(key) else {
                continue;
            };
            let depth = tickets.values().filter(|t| !t.is_expired(now)).count() as u64;
            if depth > 0 {
                out.push(QueueSnapshot {
                    game_id,
                    stake,
                    depth,
                });
            }
        }
        out.sort_by(|a, b| (&a.game_id, &a.stake).cmp(&(&b.game_id, &b.stake)));
        Ok(out)
    }

    async fn put_pending_match(&self, notice: &PendingMatch) -> Result<()> {
        let key = keys::pending_match(&notice.player, &notice.game_id, &notice.stake);
        let value = serde_json::to_string(notice).unwrap_or_default();
        let mut inner = self.inner.lock().await;
        inner
            .kv
            .insert(key, (value, current_timestamp() + PENDING_MATCH_TTL_MS));
        Ok(())
    }

    async fn take_pending_match(
        &self,
        player: &str,
        game_id: &str,
        stake: &str,
    ) -> Result<Option<PendingMatch>> {
        let key = keys::pending_match(player, game_id, stake);
        let mut inner = self.inner.lock().await;
        Ok(inner
            .take_kv(&key, current_timestamp())
            .and_then(|v| serde_json::from_str(&v).ok()))
    }

    async fn put_invite(&self, code: &str, match_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.kv.insert(
            keys::invite(code),
            (match_id.to_owned(), current_timestamp() + PENDING_MATCH_TTL_MS),
        );
        Ok(())
    }

    async fn take_invite(&self, code: &str) -> Result<Option<String>> {
        let mut inner = self.inner.lock().await;
        Ok(inner.take_kv(&keys::invite(code), current_timestamp()))
    }

    async fn put_ws_token(&self, token: &WsToken) -> Result<()> {
        let value = serde_json::to_string(token).unwrap_or_default();
        let mut inner = self.inner.lock().await;
        inner.kv.insert(
            keys::ws_token(&token.token),
            (value, current_timestamp() + WS_TOKEN_TTL_MS),
        );
        Ok(())
    }

    async fn take_ws_token(&self, token: &str) -> Result<Option<WsToken>> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .take_kv(&keys::ws_token(token), current_timestamp())
            .and_then(|v| serde_json::from_str(&v).ok()))
    }

    async fn set_active_match(&self, player: &str, entry: &ActiveMatchEntry) -> Result<()> {
        let value = serde_json::to_string(entry).unwrap_or_default();
        let mut inner = self.inner.lock().await;
        inner.kv.insert(
            keys::active_match(player),
            (value, current_timestamp() + ACTIVE_INDEX_TTL_MS),
        );
        Ok(())
    }

    async fn get_active_match(&self, player: &str) -> Result<Option<ActiveMatchEntry>> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .get_kv(&keys::active_match(player), current_timestamp())
            .and_then(|v| serde_json::from_str(&v).ok()))
    }

    async fn clear_active_match(&self, player: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.kv.remove(&keys::active_match(player));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ticket_replace_and_remove() {
        let store = MemoryCoordStore::new();
        let now = current_timestamp();
        let first = QueueTicket::new("0xaa", "tictactoe", "0", now);
        let second = QueueTicket::new("0xaa", "tictactoe", "0", now);
        store.put_ticket(&first).await.unwrap();
        store.put_ticket(&second).await.unwrap();

        let tickets = store.get_tickets("tictactoe", "0").await.unwrap();
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].id, second.id);

        // The replaced ticket's id no longer resolves.
        assert!(!store.remove_ticket_by_id(&first.id).await.unwrap());
        assert!(store.remove_ticket_by_id(&second.id).await.unwrap());
        assert!(store.get_tickets("tictactoe", "0").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_take_invite_consumes() {
        let store = MemoryCoordStore::new();
        store.put_invite("abc12345", "m1").await.unwrap();
        assert_eq!(store.take_invite("abc12345").await.unwrap().as_deref(), Some("m1"));
        assert_eq!(store.take_invite("abc12345").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ws_token_single_use() {
        let store = MemoryCoordStore::new();
        let token = WsToken::new("m1", "0xaa", current_timestamp());
        store.put_ws_token(&token).await.unwrap();
        assert!(store.take_ws_token(&token.token).await.unwrap().is_some());
        assert!(store.take_ws_token(&token.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_active_match_set_get_clear() {
        let store = MemoryCoordStore::new();
        let entry = ActiveMatchEntry {
            match_id: "m1".into(),
            game_id: "tictactoe".into(),
            stake: "0".into(),
        };
        store.set_active_match("0xaa", &entry).await.unwrap();
        assert_eq!(store.get_active_match("0xaa").await.unwrap(), Some(entry));
        store.clear_active_match("0xaa").await.unwrap();
        assert_eq!(store.get_active_match("0xaa").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_queue_snapshot_counts_live_tickets() {
        let store = MemoryCoordStore::new();
        let now = current_timestamp();
        store
            .put_ticket(&QueueTicket::new("0xaa", "tictactoe", "0", now))
            .await
            .unwrap();
        store
            .put_ticket(&QueueTicket::new("0xbb", "tictactoe", "0", now))
            .await
            .unwrap();
        let mut expired = QueueTicket::new("0xcc", "chess", "0", now);
        expired.expires_at = now.saturating_sub(1);
        store.put_ticket(&expired).await.unwrap();

        let snapshot = store.queue_snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].game_id, "tictactoe");
        assert_eq!(snapshot[0].depth, 2);
    }
}

//! Coordination-store seam.
//!
//! Queue tickets, pending-match notices, private invites, WS tokens and
//! the active-match index all live in a redis-like store with TTLs.
//! `take_*` operations are consume-on-read: at most one caller observes
//! a given record.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ActiveMatchEntry, PendingMatch, QueueSnapshot, QueueTicket, WsToken};

#[async_trait]
pub trait CoordStoreT: Send + Sync {
    /// Add or refresh a queue ticket.  Any prior ticket held by the
    /// same player under the same `(gameId, stake)` key is replaced.
    async fn put_ticket(&self, ticket: &QueueTicket) -> Result<()>;

    /// All tickets under a queue key, in no particular order.  Expired
    /// tickets may still be returned; callers filter on scan.
    async fn get_tickets(&self, game_id: &str, stake: &str) -> Result<Vec<QueueTicket>>;

    /// Remove one player's ticket; true when something was removed.
    async fn remove_ticket(&self, game_id: &str, stake: &str, player: &str) -> Result<bool>;

    /// Remove a ticket by its opaque id, wherever it is queued.
    async fn remove_ticket_by_id(&self, ticket_id: &str) -> Result<bool>;

    /// Depth of every non-empty queue key.
    async fn queue_snapshot(&self) -> Result<Vec<QueueSnapshot>>;

    async fn put_pending_match(&self, notice: &PendingMatch) -> Result<()>;

    /// Consume the pending-match notice for `(player, gameId, stake)`.
    async fn take_pending_match(
        &self,
        player: &str,
        game_id: &str,
        stake: &str,
    ) -> Result<Option<PendingMatch>>;

    async fn put_invite(&self, code: &str, match_id: &str) -> Result<()>;

    /// Consume an invite code; at most one accept succeeds.
    async fn take_invite(&self, code: &str) -> Result<Option<String>>;

    async fn put_ws_token(&self, token: &WsToken) -> Result<()>;

    /// Consume a WS token; reconnects use signed HELLOs afterwards.
    async fn take_ws_token(&self, token: &str) -> Result<Option<WsToken>>;

    async fn set_active_match(&self, player: &str, entry: &ActiveMatchEntry) -> Result<()>;

    async fn get_active_match(&self, player: &str) -> Result<Option<ActiveMatchEntry>>;

    async fn clear_active_match(&self, player: &str) -> Result<()>;
}

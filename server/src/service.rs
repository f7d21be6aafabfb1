//! The Match Service: the public operations of the server, owning
//! match lifecycle, matchmaking and the emergency switch.  The Edge API
//! (HTTP/WS) is a thin mapper onto these.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};

use dork_core::chain::parse_stake;
use dork_core::error::{Error, Result};
use dork_core::types::{
    current_timestamp, new_invite_code, new_match_id, ActiveMatchEntry, ChatMessage, Match,
    MatchStatus, PendingMatch, QueueSnapshot, QueueTicket, WsToken, CHAT_MAX_LEN,
    PENDING_MATCH_TTL_MS,
};

use crate::context::ApplicationContext;
use crate::frame::EventFrame;

pub const ENS_BATCH_LIMIT: usize = 50;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum JoinQueueOutcome {
    #[serde(rename = "matched")]
    #[serde(rename_all = "camelCase")]
    Matched {
        match_id: String,
        game_id: String,
        stake: String,
        opponent: String,
        ws_token: String,
    },
    #[serde(rename = "queued")]
    #[serde(rename_all = "camelCase")]
    Queued { ticket: String, expires_at: u64 },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMatchCreated {
    pub match_id: String,
    pub invite_code: String,
    pub ws_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMatchAccepted {
    pub match_id: String,
    pub ws_token: String,
    pub stake: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    #[serde(flatten)]
    pub record: Match,
    pub players_online: u64,
    pub spectators: u64,
}

impl ApplicationContext {
    /// Validate a stake string against the Escrow minimum.
    async fn validate_stake(&self, stake: &str) -> Result<()> {
        let value =
            parse_stake(stake).ok_or_else(|| Error::QueueInvalidStake(stake.to_owned()))?;
        if value.is_zero() {
            return Ok(());
        }
        if self.escrow.is_none() {
            return Err(Error::QueueInvalidStake("staking disabled".into()));
        }
        let minimum = self.minimum_stake().await?;
        if value < minimum {
            return Err(Error::QueueStakeBelowMinimum {
                stake: stake.to_owned(),
                minimum: minimum.to_string(),
            });
        }
        Ok(())
    }

    /// Create the match record, issue WS tokens, publish active-match
    /// index entries and launch the component set.
    async fn create_match(
        &self,
        match_id: Option<String>,
        game_id: &str,
        players: Vec<String>,
        stake: &str,
        invite_code: Option<String>,
    ) -> Result<(Match, HashMap<String, String>)> {
        let module = self
            .registry
            .get(game_id)
            .ok_or_else(|| Error::GameNotRegistered(game_id.to_owned()))?;
        let now = current_timestamp();
        let record = Match {
            id: match_id.unwrap_or_else(new_match_id),
            game_id: game_id.to_owned(),
            players: players.clone(),
            status: MatchStatus::Waiting,
            stake: stake.to_owned(),
            winner: None,
            reason: None,
            root_hash: None,
            settle_tx: None,
            invite_code,
            deposit_confirmed: players.iter().map(|p| (p.clone(), false)).collect(),
            seed: new_match_id(),
            created_at: now,
            completed_at: None,
        };

        self.storage.ensure_players(&players).await?;
        self.storage.save_match(&record).await?;

        let mut tokens = HashMap::new();
        for player in &players {
            let token = WsToken::new(&record.id, player, now);
            self.coord.put_ws_token(&token).await?;
            tokens.insert(player.clone(), token.token);

            let entry = ActiveMatchEntry {
                match_id: record.id.clone(),
                game_id: record.game_id.clone(),
                stake: record.stake.clone(),
            };
            self.coord.set_active_match(player, &entry).await?;
        }

        self.match_manager
            .launch(
                record.clone(),
                module,
                &self.match_deps(),
                self.signal_sender(),
            )
            .await?;
        info!(
            "Created match {} ({}, stake {})",
            record.id, record.game_id, record.stake
        );
        Ok((record, tokens))
    }

    /// `joinQueue`: pair with a waiting ticket or queue up.
    pub async fn join_queue(
        &self,
        player: &str,
        game_id: &str,
        stake: &str,
    ) -> Result<JoinQueueOutcome> {
        self.reject_in_emergency()?;
        if !self.registry.has(game_id) {
            return Err(Error::GameNotRegistered(game_id.to_owned()));
        }
        self.validate_stake(stake).await?;

        // A pending-match notification means the opponent's poll
        // already created our match.
        if let Some(notice) = self.coord.take_pending_match(player, game_id, stake).await? {
            if self.match_manager.is_live(&notice.match_id).await {
                return Ok(JoinQueueOutcome::Matched {
                    match_id: notice.match_id,
                    game_id: notice.game_id,
                    stake: notice.stake,
                    opponent: notice.opponent,
                    ws_token: notice.ws_token,
                });
            }
            warn!("Discarding stale pending match {}", notice.match_id);
        }

        let lock = self.pair_lock(game_id, stake).await;
        let _guard = lock.lock().await;
        let now = current_timestamp();

        let mut opponent: Option<QueueTicket> = None;
        for ticket in self.coord.get_tickets(game_id, stake).await? {
            if ticket.is_expired(now) {
                self.coord
                    .remove_ticket(game_id, stake, &ticket.player)
                    .await?;
                continue;
            }
            if ticket.player == player {
                continue;
            }
            // Each scanned ticket is removed before use; the removal
            // result guards against a concurrent consumer.
            if self
                .coord
                .remove_ticket(game_id, stake, &ticket.player)
                .await?
            {
                opponent = Some(ticket);
                break;
            }
        }

        match opponent {
            Some(opponent) => {
                // Purge our own stale ticket from the same key.
                self.coord.remove_ticket(game_id, stake, player).await?;
                let players = vec![opponent.player.clone(), player.to_owned()];
                let (record, mut tokens) =
                    self.create_match(None, game_id, players, stake, None).await?;

                let notice = PendingMatch {
                    player: opponent.player.clone(),
                    game_id: game_id.to_owned(),
                    stake: stake.to_owned(),
                    match_id: record.id.clone(),
                    opponent: player.to_owned(),
                    ws_token: tokens.remove(&opponent.player).unwrap_or_default(),
                    expires_at: now + PENDING_MATCH_TTL_MS,
                };
                self.coord.put_pending_match(&notice).await?;

                Ok(JoinQueueOutcome::Matched {
                    match_id: record.id,
                    game_id: game_id.to_owned(),
                    stake: stake.to_owned(),
                    opponent: opponent.player,
                    ws_token: tokens.remove(player).unwrap_or_default(),
                })
            }
            None => {
                let ticket = QueueTicket::new(player, game_id, stake, now);
                self.coord.put_ticket(&ticket).await?;
                Ok(JoinQueueOutcome::Queued {
                    ticket: ticket.id,
                    expires_at: ticket.expires_at,
                })
            }
        }
    }

    pub async fn leave_queue(&self, ticket_id: &str) -> Result<bool> {
        self.coord.remove_ticket_by_id(ticket_id).await
    }

    pub async fn queue_snapshot(&self) -> Result<Vec<QueueSnapshot>> {
        self.coord.queue_snapshot().await
    }

    pub async fn create_private_match(
        &self,
        player: &str,
        game_id: &str,
        stake: &str,
    ) -> Result<PrivateMatchCreated> {
        self.reject_in_emergency()?;
        if !self.registry.has(game_id) {
            return Err(Error::GameNotRegistered(game_id.to_owned()));
        }
        self.validate_stake(stake).await?;

        let match_id = new_match_id();
        let invite_code = new_invite_code();
        let now = current_timestamp();

        // The match launches when the invite is accepted; until then
        // only the row and the invite index exist.
        let record = Match {
            id: match_id.clone(),
            game_id: game_id.to_owned(),
            players: vec![player.to_owned()],
            status: MatchStatus::Waiting,
            stake: stake.to_owned(),
            winner: None,
            reason: None,
            root_hash: None,
            settle_tx: None,
            invite_code: Some(invite_code.clone()),
            deposit_confirmed: Default::default(),
            seed: new_match_id(),
            created_at: now,
            completed_at: None,
        };
        self.storage.ensure_players(std::slice::from_ref(&record.players[0])).await?;
        self.storage.save_match(&record).await?;
        self.coord.put_invite(&invite_code, &match_id).await?;

        let token = WsToken::new(&match_id, player, now);
        self.coord.put_ws_token(&token).await?;

        info!("Created private match {} with invite", match_id);
        Ok(PrivateMatchCreated {
            match_id,
            invite_code,
            ws_token: token.token,
        })
    }

    pub async fn accept_private_match(
        &self,
        player: &str,
        invite_code: &str,
    ) -> Result<PrivateMatchAccepted> {
        self.reject_in_emergency()?;
        // Consuming the invite makes a second accept fail.
        let match_id = self
            .coord
            .take_invite(invite_code)
            .await?
            .ok_or(Error::MatchNotFound)?;
        let record = self
            .storage
            .get_match(&match_id)
            .await?
            .ok_or(Error::MatchNotFound)?;
        if record.has_player(player) {
            return Err(Error::QueueDuplicateJoin);
        }
        let creator = record
            .players
            .first()
            .cloned()
            .ok_or(Error::MatchNotFound)?;

        let players = vec![creator, player.to_owned()];
        let (record, mut tokens) = self
            .create_match(
                Some(match_id),
                &record.game_id,
                players,
                &record.stake,
                record.invite_code.clone(),
            )
            .await?;

        Ok(PrivateMatchAccepted {
            match_id: record.id,
            ws_token: tokens.remove(player).unwrap_or_default(),
            stake: record.stake,
        })
    }

    /// Reconnection discovery, cross-checked against the live registry.
    pub async fn check_active_match(&self, player: &str) -> Result<Option<ActiveMatchEntry>> {
        let Some(entry) = self.coord.get_active_match(player).await? else {
            return Ok(None);
        };
        let live = match self.match_manager.view(&entry.match_id).await {
            Some(view) => view
                .read()
                .map(|v| !v.record.status.is_terminal())
                .unwrap_or(false),
            None => false,
        };
        if !live {
            self.coord.clear_active_match(player).await?;
            return Ok(None);
        }
        Ok(Some(entry))
    }

    pub async fn apply_action(
        &self,
        match_id: &str,
        player: &str,
        action: serde_json::Value,
    ) -> Result<()> {
        self.match_manager
            .send(
                match_id,
                EventFrame::SubmitAction {
                    player: player.to_owned(),
                    action,
                },
            )
            .await
    }

    pub async fn forfeit(&self, match_id: &str, player: &str) -> Result<()> {
        self.match_manager
            .send(
                match_id,
                EventFrame::Forfeit {
                    player: player.to_owned(),
                    reason: "forfeit".into(),
                },
            )
            .await
    }

    pub async fn chat(&self, match_id: &str, player: &str, message: &str) -> Result<()> {
        if message.chars().count() > CHAT_MAX_LEN {
            return Err(Error::ChatTooLong);
        }
        let is_player = match self.match_manager.view(match_id).await {
            Some(view) => view
                .read()
                .map(|v| v.record.has_player(player))
                .unwrap_or(false),
            None => return Err(Error::MatchNotFound),
        };
        if !is_player {
            return Err(Error::PlayerNotInMatch);
        }
        self.match_manager
            .send(
                match_id,
                EventFrame::Chat {
                    message: ChatMessage {
                        match_id: match_id.to_owned(),
                        player: player.to_owned(),
                        message: message.to_owned(),
                        timestamp: current_timestamp(),
                    },
                },
            )
            .await
    }

    pub async fn resolve_ens(&self, addrs: &[String]) -> Result<Vec<Option<String>>> {
        if addrs.len() > ENS_BATCH_LIMIT {
            return Err(Error::InvalidRequest(format!(
                "at most {ENS_BATCH_LIMIT} addresses per batch"
            )));
        }
        self.ens.resolve_names(addrs).await
    }

    pub async fn list_matches(&self) -> Vec<MatchSummary> {
        let mut out = Vec::new();
        for record in self.match_manager.live_records().await {
            let (players_online, spectators) = self.room_manager.count(&record.id);
            out.push(MatchSummary {
                record,
                players_online,
                spectators,
            });
        }
        out.sort_by(|a, b| b.record.created_at.cmp(&a.record.created_at));
        out
    }

    /// Live view first, persisted archive second.
    pub async fn match_detail(&self, match_id: &str) -> Result<MatchSummary> {
        if let Some(view) = self.match_manager.view(match_id).await {
            if let Ok(view) = view.read() {
                let (players_online, spectators) = self.room_manager.count(match_id);
                return Ok(MatchSummary {
                    record: view.record.clone(),
                    players_online,
                    spectators,
                });
            }
        }
        let record = self
            .storage
            .get_match(match_id)
            .await?
            .ok_or(Error::MatchNotFound)?;
        Ok(MatchSummary {
            record,
            players_online: 0,
            spectators: 0,
        })
    }

    /// Admin kill switch: draw every live match and block creation.
    pub async fn emergency_draw_all(&self) -> usize {
        self.set_emergency(true);
        let ids = self.match_manager.live_ids().await;
        let mut drawn = 0;
        for match_id in ids {
            if self
                .match_manager
                .send(
                    &match_id,
                    EventFrame::ForceDraw {
                        reason: "emergency".into(),
                    },
                )
                .await
                .is_ok()
            {
                drawn += 1;
            }
        }
        warn!("Emergency draw applied to {} matches", drawn);
        drawn
    }

    pub fn emergency_resume(&self) {
        self.set_emergency(false);
        info!("Emergency mode cleared");
    }

    /// Force-draw ACTIVE matches whose last activity is older than
    /// `timeout_ms`.
    pub async fn cleanup_stale_matches(&self, timeout_ms: u64) -> usize {
        let now = current_timestamp();
        let mut swept = 0;
        for (record, last_activity) in self.match_manager.activity_snapshot().await {
            if record.status == MatchStatus::Active && last_activity + timeout_ms < now {
                warn!("Force-drawing stale match {}", record.id);
                if self
                    .match_manager
                    .send(
                        &record.id,
                        EventFrame::ForceDraw {
                            reason: "stale".into(),
                        },
                    )
                    .await
                    .is_ok()
                {
                    swept += 1;
                }
            }
        }
        swept
    }

    /// Evict completed matches from memory after `max_age_ms`; the
    /// database rows remain.
    pub async fn cleanup_completed_matches(&self, max_age_ms: u64) -> usize {
        let now = current_timestamp();
        let mut evicted = 0;
        for (record, _) in self.match_manager.activity_snapshot().await {
            let expired = record
                .completed_at
                .map(|done| done + max_age_ms < now)
                .unwrap_or(false);
            if record.status.is_terminal() && expired {
                if self
                    .match_manager
                    .send(&record.id, EventFrame::Shutdown)
                    .await
                    .is_ok()
                {
                    evicted += 1;
                }
            }
        }
        evicted
    }
}

//! Persists the durable side of a match: moves, chat, status
//! transitions, the final result and the stats it implies.  Storage
//! errors are logged and swallowed; persistence never blocks play.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, warn};

use dork_core::error::Result;
use dork_core::storage::{MatchResultUpdate, StorageT};
use dork_core::types::{current_timestamp, Match, MatchStatus};

use crate::component::common::{Component, ComponentEnv, ConsumerPorts, Ports};
use crate::component::event_bus::CloseReason;
use crate::frame::EventFrame;

pub struct RecorderContext {
    storage: Arc<dyn StorageT>,
    record: Match,
}

pub struct Recorder {}

impl Recorder {
    pub fn init(storage: Arc<dyn StorageT>, record: Match) -> (Self, RecorderContext) {
        (Self {}, RecorderContext { storage, record })
    }
}

async fn persist(storage: &Arc<dyn StorageT>, record: &Match) -> Result<()> {
    storage.save_match(record).await
}

#[async_trait]
impl Component<ConsumerPorts, RecorderContext> for Recorder {
    fn name() -> &'static str {
        "Recorder"
    }

    async fn run(mut ports: ConsumerPorts, mut ctx: RecorderContext, env: ComponentEnv) {
        while let Some(frame) = ports.recv().await {
            let result = match frame {
                EventFrame::MoveApplied { entry } => {
                    ctx.storage.save_move(&ctx.record.id, &entry).await
                }
                EventFrame::Chat { message } => ctx.storage.save_chat(&message).await,
                EventFrame::DepositSeen { player } => {
                    ctx.record.deposit_confirmed.insert(player, true);
                    persist(&ctx.storage, &ctx.record).await
                }
                EventFrame::StatusChanged { status } => {
                    ctx.record.status = status;
                    persist(&ctx.storage, &ctx.record).await
                }
                EventFrame::MatchEnded { outcome, root_hash } => {
                    ctx.record.status = MatchStatus::Completed;
                    ctx.record.winner = outcome.winner.clone();
                    ctx.record.reason = Some(outcome.reason.clone());
                    ctx.record.root_hash = Some(root_hash);
                    ctx.record.completed_at = Some(current_timestamp());
                    let saved = persist(&ctx.storage, &ctx.record).await;
                    let stats = ctx
                        .storage
                        .record_result(&MatchResultUpdate {
                            match_id: ctx.record.id.clone(),
                            game_id: ctx.record.game_id.clone(),
                            players: ctx.record.players.clone(),
                            winner: outcome.winner,
                            draw: outcome.draw,
                            stake: ctx.record.stake.clone(),
                        })
                        .await;
                    saved.and(stats)
                }
                EventFrame::Settled { tx_id } => {
                    ctx.record.status = MatchStatus::Settled;
                    ctx.record.settle_tx = Some(tx_id);
                    persist(&ctx.storage, &ctx.record).await
                }
                EventFrame::SettleFailed => {
                    ctx.record.status = MatchStatus::Disputed;
                    persist(&ctx.storage, &ctx.record).await
                }
                EventFrame::Shutdown => {
                    warn!("{} Shutdown recorder", env.log_prefix);
                    break;
                }
                _ => Ok(()),
            };
            if let Err(e) = result {
                error!("{} Persistence error: {}", env.log_prefix, e);
            }
        }
        ports.close(CloseReason::Complete);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dork_api::types::Outcome;
    use dork_local_db::LocalDbStorage;

    fn record() -> Match {
        Match {
            id: "m1".into(),
            game_id: "tictactoe".into(),
            players: vec![
                "0x00000000000000000000000000000000000000aa".into(),
                "0x00000000000000000000000000000000000000bb".into(),
            ],
            status: MatchStatus::Active,
            stake: "500".into(),
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
    async fn test_match_end_then_settle_persists() {
        let storage: Arc<dyn StorageT> = Arc::new(LocalDbStorage::try_new_mem().unwrap());
        let (_, ctx) = Recorder::init(storage.clone(), record());
        let mut handle = Recorder::start(ctx, ComponentEnv::new("m1"));

        handle
            .send_unchecked(EventFrame::MatchEnded {
                outcome: Outcome::win("0x00000000000000000000000000000000000000aa", "forfeit"),
                root_hash: "0xroot".into(),
            })
            .await;
        handle
            .send_unchecked(EventFrame::Settled {
                tx_id: "0xtx1".into(),
            })
            .await;
        handle.send_unchecked(EventFrame::Shutdown).await;
        handle.wait().await;

        let saved = storage.get_match("m1").await.unwrap().unwrap();
        assert_eq!(saved.status, MatchStatus::Settled);
        assert_eq!(saved.settle_tx.as_deref(), Some("0xtx1"));
        assert_eq!(saved.winner.as_deref(), Some("0x00000000000000000000000000000000000000aa"));
        assert_eq!(saved.root_hash.as_deref(), Some("0xroot"));

        let winner = storage
            .get_player("0x00000000000000000000000000000000000000aa")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(winner.games_won, 1);
        assert_eq!(winner.earnings, "500");
    }
}

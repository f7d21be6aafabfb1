//! Deposit gate of one staked match.
//!
//! Polls the Escrow for observed `Deposited` events until every player
//! has paid in or the deadline passes.  Deposits surface as
//! [`EventFrame::DepositSeen`]; the deadline surfaces as
//! [`EventFrame::DepositTimeout`].  The event loop owns the resulting
//! state transitions.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::B256;
use async_trait::async_trait;
use tokio::time::{interval, sleep_until, Instant};
use tracing::{info, warn};

use dork_core::chain::{address_hex, EscrowT};

use crate::component::common::{Component, ComponentEnv, PipelinePorts, Ports};
use crate::component::event_bus::CloseReason;
use crate::frame::EventFrame;

const POLL_INTERVAL: Duration = Duration::from_secs(3);

pub struct DepositMonitorContext {
    match_id_bytes32: B256,
    players: Vec<String>,
    escrow: Arc<dyn EscrowT>,
    deadline_ms: u64,
}

pub struct DepositMonitor {}

impl DepositMonitor {
    pub fn init(
        match_id_bytes32: B256,
        players: Vec<String>,
        escrow: Arc<dyn EscrowT>,
        deadline_ms: u64,
    ) -> (Self, DepositMonitorContext) {
        (
            Self {},
            DepositMonitorContext {
                match_id_bytes32,
                players,
                escrow,
                deadline_ms,
            },
        )
    }
}

#[async_trait]
impl Component<PipelinePorts, DepositMonitorContext> for DepositMonitor {
    fn name() -> &'static str {
        "Deposit Monitor"
    }

    async fn run(mut ports: PipelinePorts, ctx: DepositMonitorContext, env: ComponentEnv) {
        let deadline = Instant::now() + Duration::from_millis(ctx.deadline_ms);
        let mut poll = interval(POLL_INTERVAL);
        let mut seen: HashSet<String> = HashSet::new();

        loop {
            tokio::select! {
                frame = ports.recv() => {
                    match frame {
                        Some(EventFrame::Shutdown) | None => {
                            ports.close(CloseReason::Complete);
                            return;
                        }
                        _ => continue,
                    }
                }
                _ = sleep_until(deadline) => {
                    warn!("{} Deposit deadline passed, {} of {} confirmed",
                        env.log_prefix, seen.len(), ctx.players.len());
                    ports.send(EventFrame::DepositTimeout).await;
                    break;
                }
                _ = poll.tick() => {
                    let deposits = match ctx.escrow.deposits(ctx.match_id_bytes32).await {
                        Ok(deposits) => deposits,
                        Err(e) => {
                            warn!("{} Escrow poll failed: {}", env.log_prefix, e);
                            continue;
                        }
                    };
                    for addr in deposits {
                        let player = address_hex(addr);
                        if ctx.players.contains(&player) && seen.insert(player.clone()) {
                            info!("{} Deposit confirmed for {}", env.log_prefix, player);
                            ports.send(EventFrame::DepositSeen { player }).await;
                        }
                    }
                    if seen.len() == ctx.players.len() {
                        info!("{} All deposits confirmed", env.log_prefix);
                        break;
                    }
                }
            }
        }
        ports.close(CloseReason::Complete);
    }
}

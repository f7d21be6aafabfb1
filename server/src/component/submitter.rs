//! Outcome attestation submission for staked matches.
//!
//! One `MatchEnded` frame produces one settlement attempt series:
//! exponential backoff, five attempts, then the match is marked
//! disputed and the transcript kept.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{error, info, warn};

use dork_api::types::Outcome;
use dork_core::canonical::parse_hash;
use dork_core::chain::{parse_address, OutcomeAttestation, SettlementT};

use crate::component::common::{Component, ComponentEnv, PipelinePorts, Ports};
use crate::component::event_bus::CloseReason;
use crate::frame::EventFrame;

const MAX_ATTEMPTS: u32 = 5;
const BACKOFF_BASE_MS: u64 = 1_000;

pub struct SubmitterContext {
    match_id_bytes32: B256,
    settlement: Arc<dyn SettlementT>,
}

pub struct Submitter {}

impl Submitter {
    pub fn init(
        match_id_bytes32: B256,
        settlement: Arc<dyn SettlementT>,
    ) -> (Self, SubmitterContext) {
        (
            Self {},
            SubmitterContext {
                match_id_bytes32,
                settlement,
            },
        )
    }
}

fn build_attestation(
    match_id_bytes32: B256,
    outcome: &Outcome,
    root_hash: &str,
) -> Option<OutcomeAttestation> {
    let winner = match outcome.winner.as_deref() {
        Some(addr) => parse_address(addr).ok()?,
        None => Address::ZERO,
    };
    let root_hash = parse_hash(root_hash).ok()?;
    Some(OutcomeAttestation {
        match_id: match_id_bytes32,
        winner,
        draw: outcome.draw,
        root_hash,
    })
}

#[async_trait]
impl Component<PipelinePorts, SubmitterContext> for Submitter {
    fn name() -> &'static str {
        "Submitter"
    }

    async fn run(mut ports: PipelinePorts, ctx: SubmitterContext, env: ComponentEnv) {
        while let Some(frame) = ports.recv().await {
            match frame {
                EventFrame::MatchEnded { outcome, root_hash } => {
                    let Some(attestation) =
                        build_attestation(ctx.match_id_bytes32, &outcome, &root_hash)
                    else {
                        error!(
                            "{} Unattestable outcome, marking disputed: {:?}",
                            env.log_prefix, outcome
                        );
                        ports.send(EventFrame::SettleFailed).await;
                        continue;
                    };

                    let mut settled = false;
                    for attempt in 0..MAX_ATTEMPTS {
                        match ctx.settlement.submit_outcome(attestation.clone()).await {
                            Ok(tx_id) => {
                                info!("{} Settled with tx {}", env.log_prefix, tx_id);
                                ports.send(EventFrame::Settled { tx_id }).await;
                                settled = true;
                                break;
                            }
                            Err(e) => {
                                warn!(
                                    "{} Settlement attempt {} failed: {}",
                                    env.log_prefix,
                                    attempt + 1,
                                    e
                                );
                                if attempt + 1 < MAX_ATTEMPTS {
                                    sleep(Duration::from_millis(BACKOFF_BASE_MS << attempt)).await;
                                }
                            }
                        }
                    }
                    if !settled {
                        error!("{} Settlement exhausted, match disputed", env.log_prefix);
                        ports.send(EventFrame::SettleFailed).await;
                    }
                }
                EventFrame::Shutdown => break,
                _ => (),
            }
        }
        ports.close(CloseReason::Complete);
    }
}

//! The per-match event loop: the only writer of match state.
//!
//! Every mutation arrives as an [`EventFrame`] and is applied in bus
//! order, which is the per-match lock discipline.  The per-move timeout
//! lives here as the deadline of the frame read, so an expiry is just a
//! synthetic forfeit frame.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::{sleep_until, Instant};
use tracing::{error, info, warn};

use dork_api::engine::SPECTATOR;
use dork_core::coordination::CoordStoreT;
use dork_core::error::Error;
use dork_core::frame::{
    DepositsConfirmedPayload, ErrorPayload, Frame, FrameType, GameOverPayload, StepResultPayload,
};
use dork_core::types::{current_timestamp, MatchStatus};

use crate::component::common::{Component, ComponentEnv, PipelinePorts, Ports};
use crate::component::event_bus::CloseReason;
use crate::frame::{EventFrame, RoomEvent};
use crate::orchestrator::MatchOrchestrator;
use crate::view::SharedMatchView;

pub struct EventLoopContext {
    pub orchestrator: MatchOrchestrator,
    pub view: SharedMatchView,
    pub coord: Arc<dyn CoordStoreT>,
    pub move_timeout: Option<Duration>,
    /// False for staked matches, which wait for the deposit gate.
    pub start_active: bool,
}

pub struct EventLoop {}

impl EventLoop {
    pub fn init(
        orchestrator: MatchOrchestrator,
        view: SharedMatchView,
        coord: Arc<dyn CoordStoreT>,
        move_timeout: Option<Duration>,
        start_active: bool,
    ) -> (Self, EventLoopContext) {
        (
            Self {},
            EventLoopContext {
                orchestrator,
                view,
                coord,
                move_timeout,
                start_active,
            },
        )
    }
}

struct Loop {
    orchestrator: MatchOrchestrator,
    view: SharedMatchView,
    coord: Arc<dyn CoordStoreT>,
    move_timeout: Option<Duration>,
    deadline: Option<Instant>,
    env: ComponentEnv,
}

impl Loop {
    fn match_id(&self) -> String {
        self.view
            .read()
            .map(|v| v.record.id.clone())
            .unwrap_or_default()
    }

    fn stamped(&self, frame_type: FrameType, payload: serde_json::Value) -> Frame {
        Frame::new(frame_type, &self.match_id(), payload)
            .with_transcript(self.orchestrator.sequence(), self.orchestrator.root_hash())
    }

    async fn send_error(&self, ports: &PipelinePorts, player: &str, error: &Error) {
        let frame = self.stamped(
            FrameType::Error,
            json!(ErrorPayload::from_error(error)),
        );
        ports
            .send(EventFrame::Broadcast {
                event: RoomEvent::to_player(player, frame),
            })
            .await;
    }

    fn sync_view<F: FnOnce(&mut crate::view::MatchView)>(&self, also: F) {
        match self.view.write() {
            Ok(mut view) => {
                view.sync_play_state(&self.orchestrator);
                also(&mut view);
            }
            Err(e) => error!("{} Poisoned match view: {}", self.env.log_prefix, e),
        }
    }

    fn arm_timer(&mut self) {
        self.deadline = match (&self.move_timeout, self.orchestrator.current_player()) {
            (Some(timeout), Some(_)) if !self.orchestrator.is_terminal() => {
                Some(Instant::now() + *timeout)
            }
            _ => None,
        };
    }

    /// Broadcast role-specific full states: one frame per player plus
    /// the public view for spectators.
    async fn broadcast_states(&self, ports: &PipelinePorts, frame_type: FrameType) {
        let Ok(view) = self.view.read().map(|v| v.clone()) else {
            return;
        };
        for player in view.record.players.clone() {
            let payload = json!({
                "observation": self.orchestrator.observation(&player),
                "status": view.record.status.to_string(),
                "currentPlayer": view.current_player,
                "players": view.record.players,
                "stake": view.record.stake,
                "yourTurn": view.current_player.as_deref() == Some(player.as_str()),
            });
            let frame = self.stamped(frame_type, payload);
            ports
                .send(EventFrame::Broadcast {
                    event: RoomEvent::to_player(&player, frame),
                })
                .await;
        }
        let public = json!({
            "observation": self.orchestrator.public_observation(),
            "status": view.record.status.to_string(),
            "currentPlayer": view.current_player,
            "players": view.record.players,
            "stake": view.record.stake,
            "yourTurn": false,
        });
        let frame = self.stamped(FrameType::SpectateState, public);
        ports
            .send(EventFrame::Broadcast {
                event: RoomEvent::to_spectators(frame),
            })
            .await;
    }

    async fn activate(&mut self, ports: &PipelinePorts) {
        info!("{} Match is now active", self.env.log_prefix);
        self.sync_view(|view| {
            view.record.status = MatchStatus::Active;
            view.last_activity = current_timestamp();
        });
        ports
            .send(EventFrame::StatusChanged {
                status: MatchStatus::Active,
            })
            .await;
        self.broadcast_states(ports, FrameType::GameState).await;
        self.arm_timer();
    }

    /// Common terminal path for real outcomes and synthetic ones.
    async fn finish(&mut self, ports: &PipelinePorts) {
        let Some(outcome) = self.orchestrator.outcome().cloned() else {
            return;
        };
        let root_hash = self.orchestrator.root_hash().to_owned();
        info!(
            "{} Match over: winner={:?}, reason={}",
            self.env.log_prefix, outcome.winner, outcome.reason
        );
        self.deadline = None;
        self.sync_view(|view| {
            view.record.status = MatchStatus::Completed;
            view.record.winner = outcome.winner.clone();
            view.record.reason = Some(outcome.reason.clone());
            view.record.root_hash = Some(root_hash.clone());
            view.record.completed_at = Some(current_timestamp());
        });

        let frame = self.stamped(
            FrameType::GameOver,
            json!(GameOverPayload {
                outcome: outcome.clone(),
                root_hash: root_hash.clone(),
            }),
        );
        ports
            .send(EventFrame::Broadcast {
                event: RoomEvent::all(frame),
            })
            .await;
        ports
            .send(EventFrame::MatchEnded { outcome, root_hash })
            .await;

        for player in self.orchestrator.players().to_vec() {
            if let Err(e) = self.coord.clear_active_match(&player).await {
                warn!("{} Failed to clear active index: {}", self.env.log_prefix, e);
            }
        }
    }

    async fn handle_submit_action(
        &mut self,
        ports: &PipelinePorts,
        player: String,
        action: serde_json::Value,
    ) {
        let waiting = self
            .view
            .read()
            .map(|v| v.record.status == MatchStatus::Waiting)
            .unwrap_or(false);
        if waiting {
            self.send_error(ports, &player, &Error::DepositRequired).await;
            return;
        }

        match self.orchestrator.submit_action(&player, action.clone()) {
            Ok(step) => {
                self.sync_view(|_| {});
                ports
                    .send(EventFrame::MoveApplied {
                        entry: step.entry.clone(),
                    })
                    .await;

                let current = self.orchestrator.current_player();
                for peer in self.orchestrator.players().to_vec() {
                    let payload = StepResultPayload {
                        player: player.clone(),
                        action: action.clone(),
                        observation: self.orchestrator.observation(&peer),
                        terminal: step.terminal,
                        outcome: step.outcome.clone(),
                        current_player: current.clone(),
                    };
                    let frame = self
                        .stamped(FrameType::StepResult, json!(payload))
                        .with_transcript(step.entry.sequence, self.orchestrator.root_hash());
                    ports
                        .send(EventFrame::Broadcast {
                            event: RoomEvent::to_player(&peer, frame),
                        })
                        .await;
                }
                let spectator_payload = StepResultPayload {
                    player: player.clone(),
                    action,
                    observation: self.orchestrator.observation(SPECTATOR),
                    terminal: step.terminal,
                    outcome: step.outcome.clone(),
                    current_player: current,
                };
                let frame = self
                    .stamped(FrameType::SpectateState, json!(spectator_payload))
                    .with_transcript(step.entry.sequence, self.orchestrator.root_hash());
                ports
                    .send(EventFrame::Broadcast {
                        event: RoomEvent::to_spectators(frame),
                    })
                    .await;

                if step.terminal {
                    self.finish(ports).await;
                } else {
                    self.arm_timer();
                }
            }
            Err(e) if e.is_user_error() => {
                self.send_error(ports, &player, &e).await;
            }
            Err(e) => {
                // Invariant breach inside the module; surface and keep
                // the match state untouched.
                error!("{} Apply failed: {}", self.env.log_prefix, e);
                self.send_error(ports, &player, &e).await;
            }
        }
    }

    async fn handle_forfeit(&mut self, ports: &PipelinePorts, player: String, reason: String) {
        if self.orchestrator.is_terminal() {
            // FORFEIT after GAME_OVER is a no-op.
            return;
        }
        if !self.orchestrator.players().contains(&player) {
            self.send_error(ports, &player, &Error::PlayerNotInMatch).await;
            return;
        }
        let outcome = self.orchestrator.forfeit_outcome(&player, &reason);
        if self.orchestrator.force_outcome(outcome).is_ok() {
            self.sync_view(|_| {});
            self.finish(ports).await;
        }
    }

    async fn handle_force_draw(&mut self, ports: &PipelinePorts, reason: String) {
        if self.orchestrator.is_terminal() {
            return;
        }
        let outcome = dork_api::types::Outcome::draw(reason);
        if self.orchestrator.force_outcome(outcome).is_ok() {
            self.sync_view(|_| {});
            self.finish(ports).await;
        }
    }

    async fn handle_deposit_seen(&mut self, ports: &PipelinePorts, player: String) {
        let all_confirmed = {
            let Ok(mut view) = self.view.write() else {
                return;
            };
            if view.record.status != MatchStatus::Waiting {
                return;
            }
            view.record.deposit_confirmed.insert(player.clone(), true);
            view.record.all_deposits_confirmed()
        };
        let frame = self.stamped(
            FrameType::DepositsConfirmed,
            json!(DepositsConfirmedPayload {
                player: player.clone(),
                all_confirmed,
            }),
        );
        ports
            .send(EventFrame::Broadcast {
                event: RoomEvent::to_player(&player, frame),
            })
            .await;
        if all_confirmed {
            self.activate(ports).await;
        }
    }

    async fn handle_deposit_timeout(&mut self, ports: &PipelinePorts) -> bool {
        let waiting = self
            .view
            .read()
            .map(|v| v.record.status == MatchStatus::Waiting)
            .unwrap_or(false);
        if !waiting {
            return false;
        }
        warn!("{} Deposit timeout, cancelling match", self.env.log_prefix);
        let frame = self.stamped(
            FrameType::Error,
            json!(ErrorPayload::from_error(&Error::DepositTimeout)),
        );
        ports
            .send(EventFrame::Broadcast {
                event: RoomEvent::all(frame),
            })
            .await;
        for player in self.orchestrator.players().to_vec() {
            if let Err(e) = self.coord.clear_active_match(&player).await {
                warn!("{} Failed to clear active index: {}", self.env.log_prefix, e);
            }
        }
        // The match is dropped without a COMPLETED transition and
        // without settlement.
        ports.send(EventFrame::Shutdown).await;
        true
    }
}

#[async_trait]
impl Component<PipelinePorts, EventLoopContext> for EventLoop {
    fn name() -> &'static str {
        "Event Loop"
    }

    async fn run(mut ports: PipelinePorts, ctx: EventLoopContext, env: ComponentEnv) {
        let mut state = Loop {
            orchestrator: ctx.orchestrator,
            view: ctx.view,
            coord: ctx.coord,
            move_timeout: ctx.move_timeout,
            deadline: None,
            env,
        };

        if ctx.start_active {
            state.activate(&ports).await;
        }

        loop {
            let frame = match state.deadline {
                Some(deadline) => tokio::select! {
                    frame = ports.recv() => frame,
                    _ = sleep_until(deadline) => {
                        state.deadline = None;
                        match state.orchestrator.current_player() {
                            Some(player) => Some(EventFrame::Forfeit {
                                player,
                                reason: "timeout".into(),
                            }),
                            None => continue,
                        }
                    }
                },
                None => ports.recv().await,
            };
            let Some(frame) = frame else {
                break;
            };

            match frame {
                EventFrame::SubmitAction { player, action } => {
                    state.handle_submit_action(&ports, player, action).await;
                }
                EventFrame::Forfeit { player, reason } => {
                    state.handle_forfeit(&ports, player, reason).await;
                }
                EventFrame::ForceDraw { reason } => {
                    state.handle_force_draw(&ports, reason).await;
                }
                EventFrame::Chat { message } => {
                    state.sync_view(|view| view.last_activity = current_timestamp());
                    let frame = state.stamped(
                        FrameType::Chat,
                        json!({"player": message.player, "message": message.message}),
                    );
                    ports
                        .send(EventFrame::Broadcast {
                            event: RoomEvent::all(frame),
                        })
                        .await;
                }
                EventFrame::DepositSeen { player } => {
                    state.handle_deposit_seen(&ports, player).await;
                }
                EventFrame::DepositTimeout => {
                    if state.handle_deposit_timeout(&ports).await {
                        break;
                    }
                }
                EventFrame::Settled { tx_id } => {
                    if let Ok(mut view) = state.view.write() {
                        view.record.status = MatchStatus::Settled;
                        view.record.settle_tx = Some(tx_id);
                    }
                }
                EventFrame::SettleFailed => {
                    if let Ok(mut view) = state.view.write() {
                        view.record.status = MatchStatus::Disputed;
                    }
                }
                EventFrame::Shutdown => {
                    info!("{} Shutdown event loop", state.env.log_prefix);
                    break;
                }
                _ => (),
            }
        }
        ports.close(CloseReason::Complete);
    }
}

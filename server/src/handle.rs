//! The component set of one live match.

use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

use dork_api::engine::GameModule;
use dork_api::types::MoveTimeout;
use dork_core::chain::{match_id_bytes32, EscrowT, SettlementT};
use dork_core::coordination::CoordStoreT;
use dork_core::error::{Error, Result};
use dork_core::storage::StorageT;
use dork_core::types::Match;

use crate::component::{
    Broadcaster, CloseReason, Component, ComponentEnv, DepositMonitor, EventBus, EventLoop,
    PortsHandle, Recorder, Submitter,
};
use crate::frame::SignalFrame;
use crate::orchestrator::MatchOrchestrator;
use crate::view::{MatchView, SharedMatchView};

/// Everything a match's components need from the application.
#[derive(Clone)]
pub struct MatchDeps {
    pub storage: Arc<dyn StorageT>,
    pub coord: Arc<dyn CoordStoreT>,
    pub escrow: Option<Arc<dyn EscrowT>>,
    pub settlement: Option<Arc<dyn SettlementT>>,
    pub settlement_enabled: bool,
    pub deposit_timeout_ms: u64,
    pub default_move_timeout_ms: u64,
}

pub struct MatchHandle {
    match_id: String,
    event_bus: EventBus,
    broadcaster: Broadcaster,
    view: SharedMatchView,
    module: Arc<dyn GameModule>,
    handles: Vec<PortsHandle>,
}

fn resolve_move_timeout(policy: MoveTimeout, default_ms: u64) -> Option<std::time::Duration> {
    match policy {
        MoveTimeout::ServerDefault => Some(std::time::Duration::from_millis(default_ms)),
        MoveTimeout::Disabled => None,
        MoveTimeout::Millis(ms) => Some(std::time::Duration::from_millis(ms)),
    }
}

impl MatchHandle {
    pub async fn try_new(
        record: Match,
        module: Arc<dyn GameModule>,
        deps: &MatchDeps,
    ) -> Result<Self> {
        let env = ComponentEnv::new(&record.id);
        let orchestrator = MatchOrchestrator::new(
            module.clone(),
            &record.id,
            &record.game_id,
            record.players.clone(),
            &record.seed,
        )?;
        let view: SharedMatchView = Arc::new(RwLock::new(MatchView::from_orchestrator(
            record.clone(),
            &orchestrator,
        )));
        let event_bus = EventBus::new(env.log_prefix.clone());
        let mut handles = Vec::new();

        let (broadcaster, broadcaster_ctx) = Broadcaster::init();
        handles.push(Broadcaster::start(broadcaster_ctx, env.clone()));

        let (_, recorder_ctx) = Recorder::init(deps.storage.clone(), record.clone());
        handles.push(Recorder::start(recorder_ctx, env.clone()));

        let staked = record.is_staked();
        if staked {
            let escrow = deps
                .escrow
                .clone()
                .ok_or_else(|| Error::QueueInvalidStake("staking disabled".into()))?;
            let (_, monitor_ctx) = DepositMonitor::init(
                match_id_bytes32(&record.id),
                record.players.clone(),
                escrow,
                deps.deposit_timeout_ms,
            );
            handles.push(DepositMonitor::start(monitor_ctx, env.clone()));

            if deps.settlement_enabled {
                if let Some(settlement) = deps.settlement.clone() {
                    let (_, submitter_ctx) =
                        Submitter::init(match_id_bytes32(&record.id), settlement);
                    handles.push(Submitter::start(submitter_ctx, env.clone()));
                }
            }
        }

        let move_timeout =
            resolve_move_timeout(module.metadata().move_timeout, deps.default_move_timeout_ms);
        let (_, event_loop_ctx) = EventLoop::init(
            orchestrator,
            view.clone(),
            deps.coord.clone(),
            move_timeout,
            !staked,
        );
        handles.push(EventLoop::start(event_loop_ctx, env.clone()));

        for handle in handles.iter_mut() {
            event_bus.attach(handle).await;
        }

        Ok(Self {
            match_id: record.id,
            event_bus,
            broadcaster,
            view,
            module,
            handles,
        })
    }

    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn view(&self) -> SharedMatchView {
        self.view.clone()
    }

    pub fn module(&self) -> Arc<dyn GameModule> {
        self.module.clone()
    }

    /// Wait until every component stopped.  A
    /// [`SignalFrame::RemoveMatch`] is sent through `signal_tx`
    /// afterwards.
    pub fn wait(&mut self, signal_tx: mpsc::Sender<SignalFrame>) -> JoinHandle<CloseReason> {
        if self.handles.is_empty() {
            panic!("Somewhere else is waiting");
        }
        let handles = std::mem::take(&mut self.handles);
        let match_id = self.match_id.clone();
        tokio::spawn(async move {
            let mut close_reason = CloseReason::Complete;
            for mut handle in handles.into_iter() {
                let reason = handle.wait().await;
                if let CloseReason::Fault(_) = reason {
                    close_reason = reason;
                }
            }
            if let Err(e) = signal_tx
                .send(SignalFrame::RemoveMatch { match_id })
                .await
            {
                error!("Failed to send RemoveMatch signal due to {}", e);
            }
            close_reason
        })
    }
}

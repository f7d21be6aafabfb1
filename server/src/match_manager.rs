use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use dork_api::engine::GameModule;
use dork_core::error::{Error, Result};
use dork_core::types::Match;

use crate::component::CloseReason;
use crate::frame::{EventFrame, SignalFrame};
use crate::handle::{MatchDeps, MatchHandle};
use crate::room::RoomManager;
use crate::view::SharedMatchView;

/// Registry of live matches.  The authoritative match objects live
/// here; everything else holds weak references by match id.
pub struct MatchManager {
    matches: Arc<Mutex<HashMap<String, MatchHandle>>>,
    room_manager: Arc<RoomManager>,
}

fn wait_and_unload(
    match_id: String,
    join_handle: JoinHandle<CloseReason>,
    matches: Arc<Mutex<HashMap<String, MatchHandle>>>,
    room_manager: Arc<RoomManager>,
) {
    tokio::spawn(async move {
        match join_handle.await {
            Ok(CloseReason::Complete) => {
                info!("Clean match handle: {}", match_id);
            }
            Ok(CloseReason::Fault(e)) => {
                error!("Match {} stopped with error: {}", match_id, e);
            }
            Err(e) => {
                error!("Unexpected error when waiting match to stop: {}", e);
            }
        }
        room_manager.unregister(&match_id);
        let mut matches = matches.lock().await;
        matches.remove(&match_id);
    });
}

impl MatchManager {
    pub fn new(room_manager: Arc<RoomManager>) -> Self {
        Self {
            matches: Arc::new(Mutex::new(HashMap::new())),
            room_manager,
        }
    }

    /// Launch the component set of a match.  Idempotent by match id.
    pub async fn launch(
        &self,
        record: Match,
        module: Arc<dyn GameModule>,
        deps: &MatchDeps,
        signal_tx: mpsc::Sender<SignalFrame>,
    ) -> Result<()> {
        let mut matches = self.matches.lock().await;
        if matches.contains_key(&record.id) {
            return Ok(());
        }
        let match_id = record.id.clone();
        let mut handle = MatchHandle::try_new(record, module, deps).await?;
        self.room_manager
            .register(&match_id, handle.broadcaster().get_broadcast_tx());
        let join_handle = handle.wait(signal_tx);
        matches.insert(match_id.clone(), handle);
        wait_and_unload(
            match_id,
            join_handle,
            self.matches.clone(),
            self.room_manager.clone(),
        );
        Ok(())
    }

    pub async fn is_live(&self, match_id: &str) -> bool {
        let matches = self.matches.lock().await;
        matches.contains_key(match_id)
    }

    pub async fn send(&self, match_id: &str, frame: EventFrame) -> Result<()> {
        let matches = self.matches.lock().await;
        if let Some(handle) = matches.get(match_id) {
            handle.event_bus().send(frame).await;
            Ok(())
        } else {
            warn!("Match {} not loaded, discard frame", match_id);
            Err(Error::MatchNotFound)
        }
    }

    pub async fn view(&self, match_id: &str) -> Option<SharedMatchView> {
        let matches = self.matches.lock().await;
        matches.get(match_id).map(|h| h.view())
    }

    /// The anchor a session needs: the shared view plus the module.
    pub async fn session_anchor(
        &self,
        match_id: &str,
    ) -> Option<(SharedMatchView, Arc<dyn GameModule>)> {
        let matches = self.matches.lock().await;
        matches.get(match_id).map(|h| (h.view(), h.module()))
    }

    pub async fn live_ids(&self) -> Vec<String> {
        let matches = self.matches.lock().await;
        matches.keys().cloned().collect()
    }

    /// Snapshot of every live match record.
    pub async fn live_records(&self) -> Vec<Match> {
        let matches = self.matches.lock().await;
        matches
            .values()
            .filter_map(|h| h.view().read().ok().map(|v| v.record.clone()))
            .collect()
    }

    /// `(record, last_activity)` pairs for the sweepers.
    pub async fn activity_snapshot(&self) -> Vec<(Match, u64)> {
        let matches = self.matches.lock().await;
        matches
            .values()
            .filter_map(|h| {
                h.view()
                    .read()
                    .ok()
                    .map(|v| (v.record.clone(), v.last_activity))
            })
            .collect()
    }

    pub async fn shutdown_all(&self) {
        let matches = self.matches.lock().await;
        for handle in matches.values() {
            handle.event_bus().send(EventFrame::Shutdown).await;
        }
    }
}

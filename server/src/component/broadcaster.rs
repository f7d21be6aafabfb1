//! Per-match fan-out of room events to connected sessions.
//!
//! Sessions subscribe through [`Broadcaster::get_broadcast_rx`]; each
//! session runs a single writer, so per-session delivery order equals
//! enqueue order here.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::component::common::{Component, ComponentEnv, ConsumerPorts, Ports};
use crate::component::event_bus::CloseReason;
use crate::frame::{EventFrame, RoomEvent};

pub struct BroadcasterContext {
    broadcast_tx: broadcast::Sender<RoomEvent>,
}

pub struct Broadcaster {
    broadcast_tx: broadcast::Sender<RoomEvent>,
}

impl Broadcaster {
    pub fn init() -> (Self, BroadcasterContext) {
        let (broadcast_tx, broadcast_rx) = broadcast::channel(64);
        drop(broadcast_rx);
        (
            Self {
                broadcast_tx: broadcast_tx.clone(),
            },
            BroadcasterContext { broadcast_tx },
        )
    }

    pub fn get_broadcast_rx(&self) -> broadcast::Receiver<RoomEvent> {
        self.broadcast_tx.subscribe()
    }

    pub fn get_broadcast_tx(&self) -> broadcast::Sender<RoomEvent> {
        self.broadcast_tx.clone()
    }
}

#[async_trait]
impl Component<ConsumerPorts, BroadcasterContext> for Broadcaster {
    fn name() -> &'static str {
        "Broadcaster"
    }

    async fn run(mut ports: ConsumerPorts, ctx: BroadcasterContext, env: ComponentEnv) {
        while let Some(frame) = ports.recv().await {
            match frame {
                EventFrame::Broadcast { event } => {
                    debug!(
                        "{} Broadcast {:?} to {:?}",
                        env.log_prefix, event.frame.frame_type, event.audience
                    );
                    if ctx.broadcast_tx.send(event).is_err() {
                        // Usually it means no receivers.
                        debug!("{} No session is listening", env.log_prefix);
                    }
                }
                EventFrame::Shutdown => {
                    warn!("{} Shutdown broadcaster", env.log_prefix);
                    break;
                }
                _ => (),
            }
        }
        ports.close(CloseReason::Complete);
    }
}

use std::sync::Arc;

use dork_core::error::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{error, warn};

use crate::component::common::Attachable;
use crate::frame::EventFrame;

/// An event bus that passes the frames between the components of one
/// match.  Every attached input receives every frame, in bus order.
pub struct EventBus {
    tx: mpsc::Sender<EventFrame>,
    attached_txs: Arc<Mutex<Vec<(String, mpsc::Sender<EventFrame>)>>>,
    close_rx: watch::Receiver<bool>,
}

impl EventBus {
    pub fn new(log_prefix: String) -> Self {
        let (close_tx, close_rx) = watch::channel(false);
        let (tx, mut rx) = mpsc::channel::<EventFrame>(32);
        let txs: Arc<Mutex<Vec<(String, mpsc::Sender<EventFrame>)>>> = Arc::new(Mutex::new(vec![]));
        let attached_txs = txs.clone();

        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let is_shutdown = matches!(frame, EventFrame::Shutdown);
                let txs = attached_txs.lock().await;
                for (id, t) in txs.iter() {
                    if t.send(frame.clone()).await.is_err() {
                        warn!(
                            "{} Failed to send frame: {} to component: {}",
                            log_prefix, frame, id
                        );
                    }
                }
                if is_shutdown {
                    let _ = close_tx.send(true);
                    break;
                }
            }
        });
        Self {
            tx,
            attached_txs: txs,
            close_rx,
        }
    }

    pub async fn attach<T>(&self, attachable: &mut T)
    where
        T: Attachable,
    {
        let mut close_rx = self.close_rx.clone();
        if let Some(mut rx) = attachable.output() {
            let tx = self.tx.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = close_rx.changed() => {
                            break;
                        }
                        frame = rx.recv() => {
                            let Some(frame) = frame else {
                                break;
                            };
                            if let Err(e) = tx.send(frame).await {
                                error!("Failed to forward frame to bus: {:?}", e);
                                return;
                            }
                        }
                    }
                }
            });
        }

        if let Some(tx) = attachable.input() {
            let mut txs = self.attached_txs.lock().await;
            txs.push((attachable.id().to_owned(), tx));
        }
    }

    pub async fn send(&self, frame: EventFrame) {
        if let Err(e) = self.tx.send(frame).await {
            error!("An error occurred when sending frame, {}", e.to_string());
        }
    }
}

/// A data represent the reason of closing.
#[derive(Debug, Clone)]
pub enum CloseReason {
    Complete,
    Fault(Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::common::{Component, ComponentEnv, ConsumerPorts, Ports};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingConsumer;

    struct CountingCtx {
        n: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Component<ConsumerPorts, CountingCtx> for CountingConsumer {
        fn name() -> &'static str {
            "Counting Consumer"
        }

        async fn run(mut ports: ConsumerPorts, ctx: CountingCtx, _env: ComponentEnv) {
            while let Some(frame) = ports.recv().await {
                if matches!(frame, EventFrame::Shutdown) {
                    break;
                }
                ctx.n.fetch_add(1, Ordering::SeqCst);
            }
            ports.close(CloseReason::Complete);
        }
    }

    #[tokio::test]
    async fn test_bus_fans_out_to_attached_components() {
        let bus = EventBus::new("[m:test]".into());
        let n = Arc::new(AtomicU32::new(0));
        let mut handle =
            CountingConsumer::start(CountingCtx { n: n.clone() }, ComponentEnv::new("test"));
        bus.attach(&mut handle).await;

        bus.send(EventFrame::DepositTimeout).await;
        bus.send(EventFrame::SettleFailed).await;
        bus.send(EventFrame::Shutdown).await;
        handle.wait().await;

        assert_eq!(n.load(Ordering::SeqCst), 2);
    }
}

use async_trait::async_trait;
use tokio::sync::{
    mpsc::{self, error::SendError},
    oneshot,
};
use tracing::{error, info, warn};

use crate::frame::EventFrame;

use super::event_bus::CloseReason;

/// Shared environment of a match's component set; the prefix tags every
/// log line with the match.
#[derive(Clone)]
pub struct ComponentEnv {
    pub log_prefix: String,
}

impl ComponentEnv {
    pub fn new(match_id: &str) -> Self {
        let shorthand: String = match_id.chars().take(8).collect();
        Self {
            log_prefix: format!("[m:{shorthand}]"),
        }
    }
}

/// An interface for a component that can be attached to the event bus.
pub trait Attachable {
    fn id(&self) -> &str;

    /// Return the input channel of current component.
    /// Returning `None` means that the component does not accept input.
    fn input(&mut self) -> Option<mpsc::Sender<EventFrame>>;

    /// Return the output channel of this component.
    /// A closed output channel means that this component has stopped.
    fn output(&mut self) -> Option<mpsc::Receiver<EventFrame>>;
}

/// The group of channels to be attached to an event bus.
pub struct PortsHandle {
    id: String,
    input_tx: Option<mpsc::Sender<EventFrame>>,
    output_rx: Option<mpsc::Receiver<EventFrame>>,
    close_rx: Option<oneshot::Receiver<CloseReason>>,
}

impl PortsHandle {
    pub async fn wait(&mut self) -> CloseReason {
        match self.close_rx.take() {
            Some(rx) => match rx.await {
                Ok(reason) => reason,
                Err(_) => {
                    error!("Component {} dropped without close reason", self.id);
                    CloseReason::Complete
                }
            },
            None => {
                panic!("Somewhere else is waiting already");
            }
        }
    }

    #[allow(dead_code)]
    pub async fn send_unchecked(&self, frame: EventFrame) {
        if let Some(ref input_tx) = self.input_tx {
            input_tx.send(frame).await.expect("Failed to send");
        } else {
            panic!("Sender is not available");
        }
    }
}

impl Attachable for PortsHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn input(&mut self) -> Option<mpsc::Sender<EventFrame>> {
        self.input_tx.clone()
    }

    fn output(&mut self) -> Option<mpsc::Receiver<EventFrame>> {
        self.output_rx.take()
    }
}

pub trait Ports: Send {
    fn create(id: String) -> (Self, PortsHandle)
    where
        Self: Sized;

    fn close(self, reason: CloseReason);
}

pub struct ConsumerPorts {
    rx: mpsc::Receiver<EventFrame>,
    close: oneshot::Sender<CloseReason>,
}

impl ConsumerPorts {
    pub async fn recv(&mut self) -> Option<EventFrame> {
        self.rx.recv().await
    }
}

impl Ports for ConsumerPorts {
    fn create(id: String) -> (Self, PortsHandle) {
        let (input_tx, input_rx) = mpsc::channel(32);
        let (close_tx, close_rx) = oneshot::channel();
        (
            Self {
                rx: input_rx,
                close: close_tx,
            },
            PortsHandle {
                id,
                input_tx: Some(input_tx),
                output_rx: None,
                close_rx: Some(close_rx),
            },
        )
    }

    fn close(self, reason: CloseReason) {
        if self.close.send(reason).is_err() {
            warn!("Failed to send close reason, handle dropped");
        }
    }
}

pub struct PipelinePorts {
    rx: mpsc::Receiver<EventFrame>,
    tx: mpsc::Sender<EventFrame>,
    close: oneshot::Sender<CloseReason>,
}

impl PipelinePorts {
    pub async fn recv(&mut self) -> Option<EventFrame> {
        self.rx.recv().await
    }

    /// Non-awaiting receive used inside timer selects.
    pub fn try_recv(&mut self) -> Option<EventFrame> {
        self.rx.try_recv().ok()
    }

    #[allow(unused)]
    pub async fn try_send(&self, frame: EventFrame) -> Result<(), SendError<EventFrame>> {
        self.tx.send(frame).await
    }

    pub async fn send(&self, frame: EventFrame) {
        if let Err(e) = self.tx.send(frame).await {
            warn!("Send error: {:?}", e)
        }
    }
}

impl Ports for PipelinePorts {
    fn create(id: String) -> (Self, PortsHandle) {
        let (input_tx, input_rx) = mpsc::channel(32);
        let (output_tx, output_rx) = mpsc::channel(32);
        let (close_tx, close_rx) = oneshot::channel();
        (
            Self {
                rx: input_rx,
                tx: output_tx,
                close: close_tx,
            },
            PortsHandle {
                id,
                input_tx: Some(input_tx),
                output_rx: Some(output_rx),
                close_rx: Some(close_rx),
            },
        )
    }

    fn close(self, reason: CloseReason) {
        if self.close.send(reason).is_err() {
            warn!("Failed to send close reason, handle dropped");
        }
    }
}

#[async_trait]
pub trait Component<P, C>
where
    P: Ports + 'static,
    C: Send + 'static,
{
    fn name() -> &'static str;

    fn start(context: C, env: ComponentEnv) -> PortsHandle {
        info!("{} Starting component: {}", env.log_prefix, Self::name());
        let (ports, handle) = P::create(Self::name().to_owned());
        tokio::spawn(async move {
            Self::run(ports, context, env).await;
        });
        handle
    }

    async fn run(ports: P, context: C, env: ComponentEnv);
}

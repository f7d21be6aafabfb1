mod broadcaster;
mod common;
mod deposit_monitor;
mod event_bus;
mod event_loop;
mod recorder;
mod submitter;

pub use broadcaster::Broadcaster;
pub use common::{Attachable, Component, ComponentEnv, PortsHandle};
pub use deposit_monitor::DepositMonitor;
pub use event_bus::{CloseReason, EventBus};
pub use event_loop::EventLoop;
pub use recorder::Recorder;
pub use submitter::Submitter;

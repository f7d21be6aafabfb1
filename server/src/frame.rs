use serde_json::Value;

use dork_api::types::Outcome;
use dork_core::frame::Frame;
use dork_core::transcript::TranscriptEntry;
use dork_core::types::{ChatMessage, MatchStatus};

/// Control signals for the application-level loop.
#[derive(Debug)]
pub enum SignalFrame {
    RemoveMatch { match_id: String },
    Shutdown,
}

/// Which sessions of a room receive a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    All,
    Players,
    Spectators,
    Player(String),
}

/// One fan-out unit.  `except` suppresses delivery to a single session,
/// identified by its id.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomEvent {
    pub frame: Frame,
    pub audience: Audience,
    pub except: Option<u64>,
}

impl RoomEvent {
    pub fn all(frame: Frame) -> Self {
        Self {
            frame,
            audience: Audience::All,
            except: None,
        }
    }

    pub fn to_player(player: &str, frame: Frame) -> Self {
        Self {
            frame,
            audience: Audience::Player(player.to_owned()),
            except: None,
        }
    }

    pub fn to_spectators(frame: Frame) -> Self {
        Self {
            frame,
            audience: Audience::Spectators,
            except: None,
        }
    }
}

/// The frames passed between the components of one match.
#[derive(Debug, Clone)]
pub enum EventFrame {
    SubmitAction {
        player: String,
        action: Value,
    },
    Forfeit {
        player: String,
        reason: String,
    },
    ForceDraw {
        reason: String,
    },
    Chat {
        message: ChatMessage,
    },
    DepositSeen {
        player: String,
    },
    DepositTimeout,
    /// Fan a frame out to the room.
    Broadcast {
        event: RoomEvent,
    },
    /// A transcript entry was appended.
    MoveApplied {
        entry: TranscriptEntry,
    },
    StatusChanged {
        status: MatchStatus,
    },
    MatchEnded {
        outcome: Outcome,
        root_hash: String,
    },
    Settled {
        tx_id: String,
    },
    SettleFailed,
    Shutdown,
}

impl std::fmt::Display for EventFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventFrame::SubmitAction { player, .. } => write!(f, "SubmitAction from {player}"),
            EventFrame::Forfeit { player, reason } => {
                write!(f, "Forfeit by {player}, reason: {reason}")
            }
            EventFrame::ForceDraw { reason } => write!(f, "ForceDraw, reason: {reason}"),
            EventFrame::Chat { message } => write!(f, "Chat from {}", message.player),
            EventFrame::DepositSeen { player } => write!(f, "DepositSeen for {player}"),
            EventFrame::DepositTimeout => write!(f, "DepositTimeout"),
            EventFrame::Broadcast { event } => {
                write!(f, "Broadcast {:?}", event.frame.frame_type)
            }
            EventFrame::MoveApplied { entry } => write!(f, "MoveApplied #{}", entry.sequence),
            EventFrame::StatusChanged { status } => write!(f, "StatusChanged to {status}"),
            EventFrame::MatchEnded { outcome, .. } => {
                write!(f, "MatchEnded, reason: {}", outcome.reason)
            }
            EventFrame::Settled { tx_id } => write!(f, "Settled, tx: {tx_id}"),
            EventFrame::SettleFailed => write!(f, "SettleFailed"),
            EventFrame::Shutdown => write!(f, "Shutdown"),
        }
    }
}

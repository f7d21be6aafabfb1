use thiserror::Error;

use dork_api::error::HandleError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Missing signature")]
    AuthMissingSignature,

    #[error("Invalid signature")]
    AuthInvalidSignature,

    #[error("Expired auth timestamp")]
    AuthExpiredTimestamp,

    #[error("Malformed player address: {0}")]
    AuthMalformedAddress(String),

    #[error("Invalid stake: {0}")]
    QueueInvalidStake(String),

    #[error("Stake below minimum: {stake} < {minimum}")]
    QueueStakeBelowMinimum { stake: String, minimum: String },

    #[error("Duplicate queue join")]
    QueueDuplicateJoin,

    #[error("Game not registered: {0}")]
    GameNotRegistered(String),

    #[error("Match not found")]
    MatchNotFound,

    #[error("Match already over")]
    MatchAlreadyOver,

    #[error("Not your turn")]
    NotYourTurn,

    #[error("Invalid action")]
    InvalidAction,

    #[error("Player not in match")]
    PlayerNotInMatch,

    #[error("Emergency mode")]
    EmergencyMode,

    #[error("Chat message too long")]
    ChatTooLong,

    #[error("Deposit required")]
    DepositRequired,

    #[error("Deposit timeout")]
    DepositTimeout,

    #[error("Deposit failed: {0}")]
    DepositFailed(String),

    #[error("HELLO not received in time")]
    HelloTimeout,

    #[error("Invalid session token")]
    InvalidToken,

    #[error("Spectators are read-only")]
    SpectatorReadOnly,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Coordination store error: {0}")]
    CoordStoreError(String),

    #[error("Chain transport error: {0}")]
    TransportError(String),

    #[error("Settlement error: {0}")]
    SettlementError(String),

    #[error("Game handle error: {0}")]
    HandleError(HandleError),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl Error {
    /// Stable tag surfaced in ERROR frames and HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::AuthMissingSignature => "auth_missing_signature",
            Error::AuthInvalidSignature => "auth_invalid_signature",
            Error::AuthExpiredTimestamp => "auth_expired_timestamp",
            Error::AuthMalformedAddress(_) => "auth_malformed_address",
            Error::QueueInvalidStake(_) => "queue_invalid_stake",
            Error::QueueStakeBelowMinimum { .. } => "queue_stake_below_minimum",
            Error::QueueDuplicateJoin => "queue_duplicate_join",
            Error::GameNotRegistered(_) => "match_unknown_game",
            Error::MatchNotFound => "match_not_found",
            Error::MatchAlreadyOver => "match_already_over",
            Error::NotYourTurn => "match_not_your_turn",
            Error::InvalidAction => "match_invalid_action",
            Error::PlayerNotInMatch => "match_not_a_player",
            Error::EmergencyMode => "match_emergency_mode",
            Error::ChatTooLong => "match_chat_too_long",
            Error::DepositRequired => "deposit_required",
            Error::DepositTimeout => "deposit_timeout",
            Error::DepositFailed(_) => "deposit_failed",
            Error::HelloTimeout => "transport_hello_timeout",
            Error::InvalidToken => "transport_invalid_token",
            Error::SpectatorReadOnly => "transport_read_only",
            Error::InvalidRequest(_) => "invalid_request",
            Error::StorageError(_)
            | Error::CoordStoreError(_)
            | Error::TransportError(_)
            | Error::SettlementError(_)
            | Error::HandleError(_)
            | Error::InternalError(_) => "internal",
        }
    }

    /// User-input failures leave state untouched and map to 4xx; the
    /// rest are 500s.
    pub fn is_user_error(&self) -> bool {
        self.code() != "internal"
    }
}

impl From<HandleError> for Error {
    fn from(e: HandleError) -> Self {
        Error::HandleError(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

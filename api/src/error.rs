use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandleError {
    #[error("Custom error: {0}")]
    Custom(String),

    #[error("Malformed game settings")]
    MalformedSettings,

    #[error("Malformed game state: {0}")]
    MalformedState(String),

    #[error("Invalid player: {0}")]
    InvalidPlayer(String),

    #[error("No enough players")]
    NoEnoughPlayers,

    #[error("Too many players")]
    TooManyPlayers,

    #[error("Duplicated module: {0}")]
    DuplicatedModule(String),

    #[error("Serialization error")]
    SerializationError,

    #[error("Internal error: {message:?}")]
    InternalError { message: String },
}

pub type HandleResult<T> = std::result::Result<T, HandleError>;

impl From<serde_json::Error> for HandleError {
    fn from(_: serde_json::Error) -> Self {
        HandleError::SerializationError
    }
}

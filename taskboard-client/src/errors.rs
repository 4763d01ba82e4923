use taskboard_core::BoardError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Board(#[from] BoardError),

    #[error("Failed to acquire lock: {0}")]
    LockError(String),

    #[error("Thread safety violation: process_events() must be called on the registration thread")]
    ThreadSafetyViolation,

    #[error("No callbacks registered yet")]
    NoCallbacksRegistered,

    #[error("Internal channel closed")]
    ChannelClosed,
}

pub type ClientResult<T> = Result<T, ClientError>;

impl From<ClientError> for BoardError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Database(e) => BoardError::Cache(e.to_string()),
            ClientError::Http(e) => BoardError::Transport(e.to_string()),
            ClientError::Serialization(e) => BoardError::Serialization(e.to_string()),
            ClientError::Board(e) => e,
            ClientError::LockError(what) => BoardError::LockError(what),
            other => BoardError::InvalidState(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_onto_board_errors() {
        let err: BoardError = ClientError::LockError("board state".into()).into();
        assert_eq!(err, BoardError::LockError("board state".into()));

        let err: BoardError = ClientError::Board(BoardError::validation("empty")).into();
        assert_eq!(err, BoardError::Validation("empty".into()));

        let err: BoardError = ClientError::ChannelClosed.into();
        assert_eq!(err, BoardError::InvalidState("Internal channel closed".into()));

        let parse = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: BoardError = ClientError::from(parse).into();
        assert!(matches!(err, BoardError::Serialization(_)));
    }
}

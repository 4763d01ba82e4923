use strum::Display;
use thiserror::Error;

use crate::models::EntityRef;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoardError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(EntityRef),

    #[error("Sync failed: {0}")]
    Sync(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to acquire lock: {0}")]
    LockError(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Coarse error taxonomy surfaced to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Sync,
    Internal,
}

impl BoardError {
    pub fn validation(message: impl Into<String>) -> Self {
        BoardError::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BoardError::Validation(_) => ErrorKind::Validation,
            BoardError::NotFound(_) => ErrorKind::NotFound,
            BoardError::Sync(_) | BoardError::Transport(_) => ErrorKind::Sync,
            BoardError::Cache(_)
            | BoardError::Serialization(_)
            | BoardError::Config(_)
            | BoardError::LockError(_)
            | BoardError::InvalidState(_) => ErrorKind::Internal,
        }
    }

    /// Re-labels a failure of the remote round trip as a `Sync` error.
    pub fn into_sync(self) -> Self {
        match self {
            BoardError::Sync(message) => BoardError::Sync(message),
            other => BoardError::Sync(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for BoardError {
    fn from(err: serde_json::Error) -> Self {
        BoardError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskId;

    #[test]
    fn test_error_kinds() {
        assert_eq!(BoardError::validation("empty").kind(), ErrorKind::Validation);
        assert_eq!(
            BoardError::NotFound(EntityRef::Task(TaskId(4))).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(BoardError::Transport("503".into()).kind(), ErrorKind::Sync);
        assert_eq!(BoardError::LockError("state".into()).kind(), ErrorKind::Internal);
        assert_eq!(ErrorKind::NotFound.to_string(), "not_found");
    }

    #[test]
    fn test_into_sync_does_not_double_wrap() {
        let err = BoardError::Sync("timeout".into()).into_sync();
        assert_eq!(err, BoardError::Sync("timeout".into()));

        let err = BoardError::Transport("connection refused".into()).into_sync();
        assert_eq!(
            err,
            BoardError::Sync("Transport error: connection refused".into())
        );
    }

    #[test]
    fn test_not_found_message_names_the_entity() {
        let err = BoardError::NotFound(EntityRef::Task(TaskId(12)));
        assert_eq!(err.to_string(), "Not found: task 12");
    }
}

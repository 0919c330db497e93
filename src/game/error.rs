//! Game-level error taxonomy

/// Broad error categories reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidState,
}

/// Errors raised by the registry, the game actors and maze generation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("game {0} not found")]
    GameNotFound(String),

    #[error("user {0} not found")]
    PlayerNotFound(String),

    #[error("game {0} already exists")]
    GameAlreadyExists(String),

    #[error("user {name} already found in {game}")]
    NameAlreadyInUse { name: String, game: String },

    /// Internal invariant violation; never the caller's fault
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("game {0} is no longer running")]
    GameClosed(String),
}

impl GameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::GameNotFound(_) | GameError::PlayerNotFound(_) => ErrorKind::NotFound,
            GameError::GameAlreadyExists(_) | GameError::NameAlreadyInUse { .. } => {
                ErrorKind::AlreadyExists
            }
            GameError::InvalidState(_) | GameError::GameClosed(_) => ErrorKind::InvalidState,
        }
    }
}

use crate::event::SessionId;
use thiserror::Error;

/// Errors produced by the session engine.
#[derive(Debug, Error)]
pub enum ChatshError {
    /// The host refused to create the process. Fatal to the single request,
    /// reported to the caller, never retried.
    #[error("spawn failed: {0}")]
    Spawn(String),

    /// Keystrokes were injected into a session that has already finished.
    #[error("session {0} is not running")]
    SessionNotRunning(SessionId),

    /// A registry lookup missed, e.g. a button callback referenced a
    /// session that has already been reaped.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ChatshResult<T> = Result<T, ChatshError>;

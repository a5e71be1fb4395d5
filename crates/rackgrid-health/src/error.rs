//! Remote channel error types.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for remote channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Faults of the shared remote execution channel.
///
/// These never reach reservation callers; the scheduler turns them into
/// `down` health outcomes.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("reconnect backoff active for another {0:?}")]
    BackingOff(Duration),

    #[error("session lost: {0}")]
    Disconnected(String),

    #[error("command timed out after {0:?}")]
    CommandTimeout(Duration),
}

impl ChannelError {
    /// Whether the session can no longer be used after this error.
    pub fn is_session_fatal(&self) -> bool {
        !matches!(self, ChannelError::CommandTimeout(_))
    }
}

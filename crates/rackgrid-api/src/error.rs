//! Errors returned to the route layer.

use rackgrid_state::StateError;
use thiserror::Error;

pub type DeskResult<T> = Result<T, DeskError>;

#[derive(Debug, Error)]
pub enum DeskError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("device not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Ledger failures, including lock timeouts, passed through unchanged.
    #[error(transparent)]
    Store(#[from] StateError),
}

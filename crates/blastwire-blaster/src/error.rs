//! Blaster error types.

use blastwire_core::WireError;
use thiserror::Error;

/// Result type alias for blaster operations.
pub type BlastResult<T> = Result<T, BlastError>;

#[derive(Debug, Error)]
pub enum BlastError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("invalid blast options: {0}")]
    InvalidOptions(String),

    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

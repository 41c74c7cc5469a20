//! Error types for mirror operations.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MirrorError {
    /// The write did not reach the mirror. The ledger remains authoritative
    /// and the booking can be repaired later.
    #[error("mirror write failed: {0}")]
    WriteFailed(String),

    #[error("mirror unavailable: {0}")]
    Unavailable(String),

    #[error("internal mirror error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, MirrorError>;

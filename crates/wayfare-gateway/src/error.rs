use std::time::Duration;

/// Errors produced by ledger gateway calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The calling identity has not been enrolled; bootstrap it instead of
    /// retrying.
    #[error("identity not enrolled: {0}")]
    IdentityNotFound(String),

    /// The identity is enrolled but may not perform this transaction.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Evaluate or submit referenced a key absent from world state.
    #[error("asset not found: {0}")]
    AssetNotFound(String),

    /// Transient: peers unreachable, endorsement failed to gather, etc.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// Transient: the call did not complete within the configured budget.
    #[error("ledger call timed out after {0:?}")]
    Timeout(Duration),

    /// Permanent: the contract refused the transaction.
    #[error("transaction rejected: {0}")]
    LedgerRejected(String),

    #[error("could not decode ledger payload: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Whether a caller may retry the same call unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::LedgerUnavailable(_) | Self::Timeout(_))
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

use thiserror::Error;
use wayfare_gateway::GatewayError;
use wayfare_mirror::MirrorError;
use wayfare_types::{Money, TypeError, UserId};
use wayfare_wallet::WalletError;

/// Errors surfaced by booking operations.
///
/// A mirror write that fails after the ledger committed is not an error
/// here; it goes to the repair log instead.
#[derive(Debug, Error)]
pub enum BookingError {
    /// Bad input. Nothing was sent to the ledger.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The booking is no longer in a state this operation applies to.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient funds for {user}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        user: UserId,
        balance: Money,
        requested: Money,
    },

    /// Transient; the same call may be retried.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// Permanent refusal by the contract.
    #[error("ledger rejected: {0}")]
    LedgerRejected(String),

    /// The acting identity must be enrolled before it can transact.
    #[error("identity not enrolled: {0}")]
    IdentityNotFound(String),

    #[error("wallet error: {0}")]
    Wallet(WalletError),

    #[error("mirror error: {0}")]
    Mirror(#[from] MirrorError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BookingError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::LedgerUnavailable(_))
    }
}

impl From<GatewayError> for BookingError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::IdentityNotFound(id) => Self::IdentityNotFound(id),
            GatewayError::Unauthorized(msg) => Self::Forbidden(msg),
            GatewayError::InvalidArgument(msg) => Self::Validation(msg),
            GatewayError::AssetNotFound(key) => Self::NotFound(key),
            GatewayError::LedgerUnavailable(msg) => Self::LedgerUnavailable(msg),
            e @ GatewayError::Timeout(_) => Self::LedgerUnavailable(e.to_string()),
            GatewayError::LedgerRejected(msg) => Self::LedgerRejected(msg),
            e @ GatewayError::Decode(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<WalletError> for BookingError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::InsufficientFunds {
                user,
                balance,
                requested,
            } => Self::InsufficientFunds {
                user,
                balance,
                requested,
            },
            WalletError::Invalid(e) => Self::Validation(e.to_string()),
            e @ WalletError::AlreadyExists(_) => Self::Conflict(e.to_string()),
            e @ WalletError::IdempotencyConflict { .. } => Self::Conflict(e.to_string()),
            other => Self::Wallet(other),
        }
    }
}

impl From<TypeError> for BookingError {
    fn from(err: TypeError) -> Self {
        Self::Validation(err.to_string())
    }
}

pub type BookingResult<T> = Result<T, BookingError>;

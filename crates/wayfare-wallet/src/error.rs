use thiserror::Error;
use wayfare_types::{IdempotencyKey, Money, TypeError, UserId};

/// Errors produced by the wallet ledger.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet for {0} already exists")]
    AlreadyExists(UserId),

    #[error("insufficient funds for {user}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        user: UserId,
        balance: Money,
        requested: Money,
    },

    #[error(transparent)]
    Invalid(#[from] TypeError),

    /// The key was already used for a different mutation.
    #[error("idempotency key {key} reused for a different operation")]
    IdempotencyConflict { key: IdempotencyKey },

    #[error("journal error: {0}")]
    Journal(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal wallet error: {0}")]
    Internal(String),
}

pub type WalletResult<T> = Result<T, WalletError>;

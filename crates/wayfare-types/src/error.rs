use thiserror::Error;

/// Errors produced by type construction and parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("identifier must not be empty: {0}")]
    EmptyIdentifier(&'static str),

    #[error("invalid amount for {field}: {reason}")]
    InvalidAmount { field: &'static str, reason: String },

    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("illegal booking transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

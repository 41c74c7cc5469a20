//! Foundation types for Wayfare.
//!
//! This crate provides the identifiers, money type, and record shapes shared
//! by every other Wayfare crate. Records mirror the JSON documents exchanged
//! with the ledger contract (camelCase fields, money as decimal strings).
//!
//! # Key Types
//!
//! - [`UserId`], [`BookingId`], [`TicketId`]: string identifiers
//! - [`Money`]: decimal amount, never a float
//! - [`Booking`] / [`BookingStatus`]: booking record and its state machine
//! - [`Ticket`] / [`TicketSummary`]: ledger ticket and its minimal projection
//! - [`Wallet`] / [`WalletTransaction`]: virtual balance and append-only log
//! - [`Principal`] / [`Capability`]: the authenticated caller
//! - [`KeyedLocks`]: per-key async serialization

pub mod booking;
pub mod error;
pub mod ids;
pub mod locks;
pub mod money;
pub mod principal;
pub mod ticket;
pub mod wallet;

pub use booking::{Booking, BookingStatus};
pub use error::TypeError;
pub use ids::{BookingId, IdempotencyKey, PaymentReference, TicketId, UserId};
pub use locks::{KeyedGuard, KeyedLocks};
pub use money::{ensure_positive, parse_money, Money};
pub use principal::{Capability, Principal, Role};
pub use ticket::{Seat, SeatStatus, Ticket, TicketSummary, TransportMode};
pub use wallet::{TransactionKind, Wallet, WalletTransaction};
